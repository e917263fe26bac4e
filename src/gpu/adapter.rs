// SPDX-License-Identifier: AGPL-3.0-only

//! Adapter discovery and selection.
//!
//! `PERIDYN_GPU_ADAPTER` picks the adapter: an enumeration index, a
//! case-insensitive name substring, or `auto`/unset for the first
//! discrete adapter with `SHADER_F64` (any f64 adapter as fallback).
//! `PERIDYN_WGPU_BACKEND` restricts the instance to `vulkan`, `metal` or
//! `dx12`.

use crate::error::{PeridynError, Result};

/// Summary of one enumerated adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub index: usize,
    pub name: String,
    pub driver: String,
    pub has_f64: bool,
    pub device_type: wgpu::DeviceType,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.device_type {
            wgpu::DeviceType::DiscreteGpu => "discrete",
            wgpu::DeviceType::IntegratedGpu => "integrated",
            wgpu::DeviceType::VirtualGpu => "virtual",
            wgpu::DeviceType::Cpu => "cpu",
            wgpu::DeviceType::Other => "other",
        };
        let precision = if self.has_f64 { "f64" } else { "f32 only" };
        write!(f, "[{}] {} ({}, {kind}, {precision})", self.index, self.name, self.driver)
    }
}

fn backends_from_env() -> wgpu::Backends {
    match std::env::var("PERIDYN_WGPU_BACKEND").as_deref() {
        Ok("vulkan") => wgpu::Backends::VULKAN,
        Ok("metal") => wgpu::Backends::METAL,
        Ok("dx12") => wgpu::Backends::DX12,
        _ => wgpu::Backends::all(),
    }
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: backends_from_env(),
        ..Default::default()
    })
}

/// All adapters visible to wgpu.
#[must_use]
pub fn enumerate_adapters() -> Vec<AdapterInfo> {
    instance()
        .enumerate_adapters(backends_from_env())
        .into_iter()
        .enumerate()
        .map(|(index, adapter)| {
            let info = adapter.get_info();
            AdapterInfo {
                index,
                name: info.name,
                driver: info.driver,
                has_f64: adapter.features().contains(wgpu::Features::SHADER_F64),
                device_type: info.device_type,
            }
        })
        .collect()
}

/// Pick the adapter named by `PERIDYN_GPU_ADAPTER`, or auto-select.
///
/// # Errors
///
/// [`PeridynError::BackendUnavailable`] when no adapter matches or none
/// supports `SHADER_F64`.
pub fn select_adapter() -> Result<wgpu::Adapter> {
    let selector = std::env::var("PERIDYN_GPU_ADAPTER")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let adapters = instance().enumerate_adapters(backends_from_env());
    if adapters.is_empty() {
        return Err(PeridynError::BackendUnavailable(String::from(
            "no GPU adapter found",
        )));
    }

    let chosen = if selector.is_empty() || selector == "auto" {
        let mut f64_adapters: Vec<wgpu::Adapter> = adapters
            .into_iter()
            .filter(|a| a.features().contains(wgpu::Features::SHADER_F64))
            .collect();
        let discrete = f64_adapters
            .iter()
            .position(|a| a.get_info().device_type == wgpu::DeviceType::DiscreteGpu);
        match discrete {
            Some(i) => Some(f64_adapters.swap_remove(i)),
            None => f64_adapters.into_iter().next(),
        }
    } else if let Ok(index) = selector.parse::<usize>() {
        adapters.into_iter().nth(index)
    } else {
        adapters
            .into_iter()
            .find(|a| a.get_info().name.to_lowercase().contains(&selector))
    };

    let adapter = chosen.ok_or_else(|| {
        PeridynError::BackendUnavailable(if selector.is_empty() {
            String::from("no adapter supports SHADER_F64")
        } else {
            format!("no adapter matches PERIDYN_GPU_ADAPTER='{selector}'")
        })
    })?;
    if !adapter.features().contains(wgpu::Features::SHADER_F64) {
        return Err(PeridynError::BackendUnavailable(format!(
            "adapter '{}' lacks SHADER_F64",
            adapter.get_info().name
        )));
    }
    Ok(adapter)
}

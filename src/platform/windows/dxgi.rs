//! DXGI adapter enumeration and video memory queries

use windows::core::Interface as _;
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter1, IDXGIAdapter3, IDXGIFactory1, DXGI_ADAPTER_DESC1,
    DXGI_ADAPTER_FLAG_SOFTWARE, DXGI_MEMORY_SEGMENT_GROUP, DXGI_MEMORY_SEGMENT_GROUP_LOCAL,
    DXGI_MEMORY_SEGMENT_GROUP_NON_LOCAL, DXGI_QUERY_VIDEO_MEMORY_INFO,
};

use crate::core::gpu::{
    AdapterDescriptor, GpuQuery, Luid, SegmentGroup, SegmentUsage, VideoMemoryInfo,
};
use crate::error::{Result, TelemetryError};
use crate::platform::d3dkmt;

fn hresult_error(call: &'static str, err: windows::core::Error) -> TelemetryError {
    TelemetryError::native(call, err.code().0 as u32)
}

/// One adapter reference, acquired during enumeration and released on drop
///
/// Not `Clone`: the only way to release the reference is to drop the handle,
/// and the handle can only be dropped once.
struct AdapterHandle {
    adapter: IDXGIAdapter1,
}

// SAFETY: DXGI adapter objects are free-threaded; the handle is never
// exposed outside this module.
unsafe impl Send for AdapterHandle {}
unsafe impl Sync for AdapterHandle {}

impl AdapterHandle {
    fn describe(&self) -> Result<DXGI_ADAPTER_DESC1> {
        // SAFETY: `adapter` is a live reference owned by this handle.
        unsafe { self.adapter.GetDesc1() }.map_err(|e| hresult_error("GetDesc1", e))
    }

    fn query_video_memory(&self, group: DXGI_MEMORY_SEGMENT_GROUP) -> Result<VideoMemoryInfo> {
        let adapter3: IDXGIAdapter3 = self
            .adapter
            .cast()
            .map_err(|e| hresult_error("QueryInterface(IDXGIAdapter3)", e))?;

        let mut info = DXGI_QUERY_VIDEO_MEMORY_INFO::default();
        // SAFETY: `info` is a valid out-parameter for the duration of the call.
        unsafe { adapter3.QueryVideoMemoryInfo(0, group, &mut info) }
            .map_err(|e| hresult_error("QueryVideoMemoryInfo", e))?;

        Ok(VideoMemoryInfo {
            budget: info.Budget,
            current_usage: info.CurrentUsage,
        })
    }
}

fn luid_of(desc: &DXGI_ADAPTER_DESC1) -> Luid {
    Luid::new(desc.AdapterLuid.LowPart, desc.AdapterLuid.HighPart)
}

fn name_of(desc: &DXGI_ADAPTER_DESC1) -> String {
    let len = desc
        .Description
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(desc.Description.len());
    String::from_utf16_lossy(&desc.Description[..len])
}

/// [`GpuQuery`] backed by DXGI for memory budgets and D3DKMT for scheduler statistics
pub struct DxgiGpuQuery {
    handles: Vec<AdapterHandle>,
    descriptors: Vec<AdapterDescriptor>,
}

impl DxgiGpuQuery {
    pub fn open() -> Result<Self> {
        // SAFETY: plain factory creation; the factory is dropped at the end of enumeration.
        let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1::<IDXGIFactory1>() }
            .map_err(|e| hresult_error("CreateDXGIFactory1", e))?;

        let mut handles = Vec::new();
        let mut descriptors = Vec::new();
        let mut index: u32 = 0;

        // SAFETY: EnumAdapters1 returns an owned reference or DXGI_ERROR_NOT_FOUND past the end.
        while let Ok(adapter) = unsafe { factory.EnumAdapters1(index) } {
            index += 1;
            let handle = AdapterHandle { adapter };

            let desc = match handle.describe() {
                Ok(desc) => desc,
                Err(e) => {
                    log::debug!("Skipping adapter {}: {}", index - 1, e);
                    continue;
                }
            };

            descriptors.push(AdapterDescriptor {
                index: handles.len(),
                name: name_of(&desc),
                luid: luid_of(&desc),
                is_software: desc.Flags & (DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0,
                dedicated_video_memory: desc.DedicatedVideoMemory as u64,
            });
            handles.push(handle);
        }

        if handles.is_empty() {
            return Err(TelemetryError::not_supported("No DXGI adapters found"));
        }

        for adapter in &descriptors {
            log::debug!(
                "DXGI adapter {}: {} (LUID {}, software: {})",
                adapter.index,
                adapter.name,
                adapter.luid,
                adapter.is_software
            );
        }

        Ok(Self {
            handles,
            descriptors,
        })
    }

    fn handle(&self, adapter: usize) -> Result<&AdapterHandle> {
        self.handles
            .get(adapter)
            .ok_or_else(|| TelemetryError::not_found(format!("GPU adapter {}", adapter)))
    }
}

impl GpuQuery for DxgiGpuQuery {
    fn adapters(&self) -> &[AdapterDescriptor] {
        &self.descriptors
    }

    fn resolve_luid(&self, adapter: usize) -> Result<Luid> {
        let desc = self.handle(adapter)?.describe()?;
        Ok(luid_of(&desc))
    }

    fn query_video_memory(&self, adapter: usize, group: SegmentGroup) -> Result<VideoMemoryInfo> {
        let group = match group {
            SegmentGroup::Local => DXGI_MEMORY_SEGMENT_GROUP_LOCAL,
            SegmentGroup::NonLocal => DXGI_MEMORY_SEGMENT_GROUP_NON_LOCAL,
        };
        self.handle(adapter)?.query_video_memory(group)
    }

    fn node_count(&self, luid: Luid) -> Result<u32> {
        Ok(d3dkmt::query_adapter(luid)?.node_count)
    }

    fn node_running_time(&self, luid: Luid, node: u32) -> Result<u64> {
        d3dkmt::query_node_running_time(luid, node)
    }

    fn segment_usage(&self, luid: Luid) -> Result<Vec<SegmentUsage>> {
        let stats = d3dkmt::query_adapter(luid)?;
        (0..stats.segment_count)
            .map(|segment| d3dkmt::query_segment(luid, segment))
            .collect()
    }
}

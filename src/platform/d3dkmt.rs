//! Kernel GPU scheduler statistics (`D3DKMTQueryStatistics`)
//!
//! The structure is undocumented and has changed size between OS releases,
//! so it is handled as an aligned opaque buffer. Every offset into it is a
//! constant in this file; a layout change is fixed here and nowhere else.

use crate::core::gpu::{Luid, SegmentGroup, SegmentUsage};
use crate::error::Result;

/// Full `D3DKMT_QUERYSTATISTICS` size on 64-bit Windows
const STATISTICS_SIZE: usize = 0x328;

const TYPE_OFFSET: usize = 0x00;
const LUID_OFFSET: usize = 0x04;
const RESULT_OFFSET: usize = 0x18;
/// The query-parameter union follows the result union
const QUERY_OFFSET: usize = 0x320;

// Offsets relative to RESULT_OFFSET
const ADAPTER_SEGMENT_COUNT: usize = 0;
const ADAPTER_NODE_COUNT: usize = 4;
const NODE_GLOBAL_RUNNING_TIME: usize = 0;
const SEGMENT_BYTES_RESIDENT: usize = 16;
const SEGMENT_PROPERTIES: usize = 104;

const SEGMENT_GROUP_SHIFT: u32 = 6;
const SEGMENT_GROUP_MASK: u64 = 0x3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum StatisticsKind {
    Adapter = 0,
    Segment = 3,
    Node = 5,
}

#[repr(C, align(8))]
struct StatisticsBuffer([u8; STATISTICS_SIZE]);

impl StatisticsBuffer {
    fn new(kind: StatisticsKind, luid: Luid) -> Self {
        let mut buffer = Self([0; STATISTICS_SIZE]);
        buffer.write_u32(TYPE_OFFSET, kind as u32);
        buffer.write_u32(LUID_OFFSET, luid.low);
        buffer.write_u32(LUID_OFFSET + 4, luid.high as u32);
        buffer
    }

    fn with_query_id(kind: StatisticsKind, luid: Luid, id: u32) -> Self {
        let mut buffer = Self::new(kind, luid);
        buffer.write_u32(QUERY_OFFSET, id);
        buffer
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.0[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn result_u32(&self, offset: usize) -> u32 {
        let start = RESULT_OFFSET + offset;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.0[start..start + 4]);
        u32::from_le_bytes(bytes)
    }

    fn result_u64(&self, offset: usize) -> u64 {
        let start = RESULT_OFFSET + offset;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[start..start + 8]);
        u64::from_le_bytes(bytes)
    }
}

/// Local/non-local classification packed into the segment properties word
pub fn segment_group_from_properties(properties: u64) -> SegmentGroup {
    match (properties >> SEGMENT_GROUP_SHIFT) & SEGMENT_GROUP_MASK {
        0 => SegmentGroup::Local,
        _ => SegmentGroup::NonLocal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterStatistics {
    pub segment_count: u32,
    pub node_count: u32,
}

pub fn query_adapter(luid: Luid) -> Result<AdapterStatistics> {
    let mut buffer = StatisticsBuffer::new(StatisticsKind::Adapter, luid);
    sys::query(&mut buffer)?;
    Ok(AdapterStatistics {
        segment_count: buffer.result_u32(ADAPTER_SEGMENT_COUNT),
        node_count: buffer.result_u32(ADAPTER_NODE_COUNT),
    })
}

/// Global running time of one node, in 100ns ticks
pub fn query_node_running_time(luid: Luid, node: u32) -> Result<u64> {
    let mut buffer = StatisticsBuffer::with_query_id(StatisticsKind::Node, luid, node);
    sys::query(&mut buffer)?;
    Ok(buffer.result_u64(NODE_GLOBAL_RUNNING_TIME))
}

pub fn query_segment(luid: Luid, segment_id: u32) -> Result<SegmentUsage> {
    let mut buffer = StatisticsBuffer::with_query_id(StatisticsKind::Segment, luid, segment_id);
    sys::query(&mut buffer)?;
    Ok(SegmentUsage {
        segment_id,
        group: segment_group_from_properties(buffer.result_u64(SEGMENT_PROPERTIES)),
        bytes_resident: buffer.result_u64(SEGMENT_BYTES_RESIDENT),
    })
}

#[cfg(windows)]
mod sys {
    use super::StatisticsBuffer;
    use crate::error::{Result, TelemetryError};

    #[link(name = "gdi32")]
    extern "system" {
        fn D3DKMTQueryStatistics(statistics: *mut StatisticsBuffer) -> i32;
    }

    pub(super) fn query(buffer: &mut StatisticsBuffer) -> Result<()> {
        // SAFETY: the buffer is a writable, 8-aligned block of the full
        // structure size; the call writes only inside it.
        let status = unsafe { D3DKMTQueryStatistics(buffer) };
        if status == 0 {
            Ok(())
        } else {
            Err(TelemetryError::native("D3DKMTQueryStatistics", status as u32))
        }
    }
}

#[cfg(not(windows))]
mod sys {
    use super::StatisticsBuffer;
    use crate::error::{Result, TelemetryError};

    pub(super) fn query(_buffer: &mut StatisticsBuffer) -> Result<()> {
        Err(TelemetryError::not_supported(
            "GPU scheduler statistics are only available on Windows",
        ))
    }
}

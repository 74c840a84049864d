//! Performance Data Helper (PDH) counter backend

use std::ptr;

use windows_sys::Win32::System::Performance::{
    PdhAddEnglishCounterW, PdhCloseQuery, PdhCollectQueryData, PdhEnumObjectItemsW,
    PdhEnumObjectsW, PdhGetFormattedCounterValue, PdhGetRawCounterValue, PdhOpenQueryW,
    PDH_FMT_COUNTERVALUE, PDH_HCOUNTER, PDH_HQUERY, PDH_RAW_COUNTER,
};

use crate::core::counters::{CounterBackend, CounterPath, CounterReader};
use crate::error::{Result, TelemetryError};

const ERROR_SUCCESS: u32 = 0;
const PDH_MORE_DATA: u32 = 0x8000_07D2;
const PDH_CSTATUS_VALID_DATA: u32 = 0x0000_0000;
const PDH_CSTATUS_NEW_DATA: u32 = 0x0000_0001;
const PDH_CSTATUS_NO_INSTANCE: u32 = 0x8000_07D1;
const PDH_CSTATUS_NO_OBJECT: u32 = 0xC000_0BB8;
const PDH_FMT_DOUBLE: u32 = 0x0000_0200;
const PDH_FMT_NOCAP100: u32 = 0x0000_8000;
const PERF_DETAIL_WIZARD: u32 = 400;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn check(call: &'static str, status: u32) -> Result<()> {
    match status {
        ERROR_SUCCESS => Ok(()),
        PDH_CSTATUS_NO_INSTANCE | PDH_CSTATUS_NO_OBJECT => Err(TelemetryError::not_found(
            format!("{} reported a missing counter instance", call),
        )),
        code => Err(TelemetryError::native(call, code)),
    }
}

/// Instance names of a PDH object. Repeated names get `#1`, `#2`, ...
/// suffixes, which is how counter paths address them.
pub fn index_duplicate_instances(names: Vec<String>) -> Vec<String> {
    let mut seen: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            let indexed = if *count == 0 {
                name
            } else {
                format!("{}#{}", name, count)
            };
            *count += 1;
            indexed
        })
        .collect()
}

/// Splits a double-NUL-terminated UTF-16 string list
fn parse_multi_sz(buffer: &[u16]) -> Vec<String> {
    buffer
        .split(|&c| c == 0)
        .take_while(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

/// A single-counter PDH query. Closing the query releases the counter.
struct PdhCounter {
    query: PDH_HQUERY,
    counter: PDH_HCOUNTER,
    path: String,
}

// SAFETY: PDH query handles may be used from any thread; access is
// serialised through `&mut self`.
unsafe impl Send for PdhCounter {}
unsafe impl Sync for PdhCounter {}

impl PdhCounter {
    fn open(path: &CounterPath) -> Result<Self> {
        let display = path.to_string();
        let mut handle = Self {
            query: ptr::null_mut(),
            counter: ptr::null_mut(),
            path: display,
        };

        // SAFETY: out-parameters point at fields of `handle`, which closes
        // the query on drop whether or not the counter was added.
        unsafe {
            check(
                "PdhOpenQueryW",
                PdhOpenQueryW(ptr::null(), 0, &mut handle.query),
            )?;
            let wide_path = wide(&handle.path);
            check(
                "PdhAddEnglishCounterW",
                PdhAddEnglishCounterW(handle.query, wide_path.as_ptr(), 0, &mut handle.counter),
            )?;
            // Rate counters need a prior sample
            check("PdhCollectQueryData", PdhCollectQueryData(handle.query))?;
        }

        Ok(handle)
    }

    fn collect(&mut self) -> Result<()> {
        // SAFETY: `query` is open for the lifetime of `self`.
        check("PdhCollectQueryData", unsafe { PdhCollectQueryData(self.query) })
    }
}

impl CounterReader for PdhCounter {
    fn next_value(&mut self) -> Result<f64> {
        self.collect()?;

        // SAFETY: zeroed POD out-parameter; the union is read as the
        // double variant requested by PDH_FMT_DOUBLE.
        unsafe {
            let mut value: PDH_FMT_COUNTERVALUE = std::mem::zeroed();
            check(
                "PdhGetFormattedCounterValue",
                PdhGetFormattedCounterValue(
                    self.counter,
                    PDH_FMT_DOUBLE | PDH_FMT_NOCAP100,
                    ptr::null_mut(),
                    &mut value,
                ),
            )?;
            match value.CStatus {
                PDH_CSTATUS_VALID_DATA | PDH_CSTATUS_NEW_DATA => Ok(value.Anonymous.doubleValue),
                status => check("PdhGetFormattedCounterValue", status).map(|_| 0.0),
            }
        }
    }

    fn raw_value(&mut self) -> Result<i64> {
        self.collect()?;

        // SAFETY: zeroed POD out-parameter.
        unsafe {
            let mut raw: PDH_RAW_COUNTER = std::mem::zeroed();
            check(
                "PdhGetRawCounterValue",
                PdhGetRawCounterValue(self.counter, ptr::null_mut(), &mut raw),
            )?;
            match raw.CStatus {
                PDH_CSTATUS_VALID_DATA | PDH_CSTATUS_NEW_DATA => Ok(raw.FirstValue),
                status => check("PdhGetRawCounterValue", status).map(|_| 0),
            }
        }
    }
}

impl Drop for PdhCounter {
    fn drop(&mut self) {
        if !self.query.is_null() {
            // SAFETY: the query was opened by this handle and is closed once.
            unsafe {
                PdhCloseQuery(self.query);
            }
            log::trace!("Closed PDH query for {}", self.path);
        }
    }
}

#[derive(Debug, Default)]
pub struct PdhBackend;

impl PdhBackend {
    pub fn new() -> Self {
        Self
    }

    fn enum_object_items(&self, category: &str) -> Result<(Vec<u16>, Vec<u16>)> {
        let object = wide(category);
        let mut counter_len: u32 = 0;
        let mut instance_len: u32 = 0;

        // SAFETY: sizing call with null buffers; lengths are out-parameters.
        let status = unsafe {
            PdhEnumObjectItemsW(
                ptr::null(),
                ptr::null(),
                object.as_ptr(),
                ptr::null_mut(),
                &mut counter_len,
                ptr::null_mut(),
                &mut instance_len,
                PERF_DETAIL_WIZARD,
                0,
            )
        };
        if status != PDH_MORE_DATA {
            check("PdhEnumObjectItemsW", status)?;
        }

        let mut counters = vec![0u16; counter_len as usize];
        let mut instances = vec![0u16; instance_len as usize];

        // SAFETY: buffers are sized by the previous call.
        let status = unsafe {
            PdhEnumObjectItemsW(
                ptr::null(),
                ptr::null(),
                object.as_ptr(),
                if counters.is_empty() { ptr::null_mut() } else { counters.as_mut_ptr() },
                &mut counter_len,
                if instances.is_empty() { ptr::null_mut() } else { instances.as_mut_ptr() },
                &mut instance_len,
                PERF_DETAIL_WIZARD,
                0,
            )
        };
        check("PdhEnumObjectItemsW", status)?;

        Ok((counters, instances))
    }

    fn refresh_object_list(&self) {
        let mut len: u32 = 0;
        // SAFETY: sizing call with refresh; only updates PDH's internal cache.
        unsafe {
            PdhEnumObjectsW(
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
                &mut len,
                PERF_DETAIL_WIZARD,
                1,
            );
        }
    }
}

impl CounterBackend for PdhBackend {
    fn category_exists(&self, category: &str) -> bool {
        self.enum_object_items(category).is_ok()
    }

    fn instance_names(&self, category: &str) -> Result<Vec<String>> {
        self.refresh_object_list();
        let (_, instances) = self.enum_object_items(category)?;
        Ok(index_duplicate_instances(parse_multi_sz(&instances)))
    }

    fn open(&self, path: &CounterPath) -> Result<Box<dyn CounterReader>> {
        Ok(Box::new(PdhCounter::open(path)?))
    }
}

// UI and formatting module

pub mod formatters;

// Re-export commonly used items for cleaner imports
pub use formatters::{
    format_mb, format_percent, format_rate, format_size, format_timestamp, print_section_header,
};

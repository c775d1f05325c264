//! Radar Sources
//!
//! Source fetchers turning a [`SourceRef`](radar_core::SourceRef) into a
//! [`RawInput`](radar_core::RawInput):
//! - Public web pages (reqwest + HTML text extraction)
//! - Company registry profiles (JSON lookup by registry number)
//! - A composite fetcher routing each reference to the right source

pub mod fetcher;
pub mod http;
pub mod registry;

pub use fetcher::*;
pub use http::*;
pub use registry::*;

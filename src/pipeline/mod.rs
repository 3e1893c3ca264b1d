//! Pipeline stages around the reconstruction engine.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ analyze ──▶ response
//! (URL/path) (pdfium)  (base64)   (VLM or     (unwrap +
//!                                  recorded)   lenient parse)
//! ```
//!
//! 1. [`input`]    — canonicalise a path, URL, or byte buffer to a local PDF
//! 2. [`render`]   — rasterise one page at a time in `spawn_blocking`
//! 3. [`encode`]   — PNG-encode and base64-wrap a page for the vision request
//! 4. [`analyze`]  — get each page's layout, with retry, timeout and
//!    placeholders; the only stage with network I/O
//! 5. [`response`] — strip fences and prose from the model's answer

pub mod analyze;
pub mod encode;
pub mod input;
pub mod render;
pub mod response;

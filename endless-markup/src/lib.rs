//! # Endless Markup
//!
//! Sanitization and context extraction for generated markup fragments.
//!
//! ## Features
//! - Permissive, total fragment parser (malformed markup is tolerated, never rejected)
//! - Sanitizer that removes every script vector while keeping visual structure
//! - Inline `alert(...)` handlers on buttons reduced to vetted data directives
//! - Label and static-metadata extraction for history display and state carry-over
//!
//! ## Example
//! ```
//! use endless_markup::{extract_label, sanitize};
//!
//! let safe = sanitize(r#"<h1>Cave</h1><a href="javascript:alert(1)" onclick="x()">Enter</a>"#);
//! assert_eq!(safe.as_str(), r##"<h1>Cave</h1><a href="#">Enter</a>"##);
//! assert_eq!(extract_label(&safe), "Cave");
//! ```

pub mod directive;
pub mod error;
pub mod extract;
pub mod fragment;
pub mod interactive;
pub mod metadata;
pub mod parser;
pub mod sanitizer;
pub mod serialize;

// --- Core types ---
pub use directive::{AlertDirective, DIRECTIVE_MESSAGE_ATTR, DIRECTIVE_TYPE_ATTR};
pub use error::{MarkupError, MarkupResult};
pub use fragment::{truncate_chars, Attribute, Element, Fragment, Node};
pub use interactive::{ElementKind, InteractiveElement};
pub use metadata::MetadataRecord;
pub use sanitizer::{SanitizeReport, SanitizedFragment};

// --- Operations ---
pub use extract::{
    extract_label, extract_label_with_fallback, extract_metadata, try_extract_metadata,
    DEFAULT_FALLBACK_LABEL, STATIC_METADATA_ATTR,
};
pub use sanitizer::{sanitize, sanitize_with_report};

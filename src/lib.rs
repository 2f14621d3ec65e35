//! # dental-reports – report templates rendered to HTML and PDF
//!
//! Staff define report templates whose JSON field schema drives a dynamic
//! form. Filled-in forms are substituted into the template's HTML and the
//! result is converted to PDF by the in-crate rendering pipeline:
//!
//! 1. **Parse** – HTML string → DOM tree ([`dom`])
//! 2. **Style** – stylesheet rules, utility classes and inline styles ([`style`])
//! 3. **Layout** – compute flexbox/grid layout with Taffy ([`layout`])
//! 4. **Paginate** – split into pages, add footers ([`pagination`])
//! 5. **Render** – emit PDF bytes via printpdf ([`render`])
//!
//! Records (templates, reports, categories, specialties, clinics and dentist
//! contacts) live in a JSON [`store`]; [`app`] holds the user-facing
//! operations and [`cli`] exposes them on the command line.

pub mod app;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod document;
pub mod dom;
pub mod error;
pub mod fonts;
pub mod forms;
pub mod layout;
pub mod layout_config;
pub mod mail;
pub mod media;
pub mod models;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod schema;
pub mod store;
pub mod style;
pub mod templating;

// Re-exports for convenience
pub use app::App;
pub use error::{Error, Result};
pub use pipeline::{generate_pdf, PageOrientation, PipelineConfig};

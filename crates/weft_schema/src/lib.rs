//! WEFT Schema Validation
//!
//! Validates protocol data and operation payloads against JSON-Schema
//! documents and meta-checks the documents themselves at registration.
//!
//! Supported vocabulary: `type`, `enum`, `const`, numeric bounds, string
//! length, `pattern`, `format`, `items`, array bounds, `uniqueItems`,
//! `required`, `properties`, `additionalProperties`, property counts and
//! the `allOf`/`anyOf`/`oneOf`/`not` combinators.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod check;
pub mod format;
pub mod meta;
pub mod validator;

// Re-exports
pub use check::check_value;
pub use meta::check_schema;
pub use validator::{JsonSchemaValidator, SchemaValidator, ValidatorMetrics};

//! A small templating language for embedding in a host program.
//!
//! A source document interleaves literal text with `{{…}}` tokens.  A token
//! names either a *variable* (`{{name$}}` reads it, `{{name$ body}}` assigns
//! and reads it) or a *command* (`{{name(key=value) body}}`), a callback the
//! host registers on the context.  Parsing produces an element tree;
//! evaluation walks the tree and yields a single output string.
//!
//! ```
//! use ztext::ZText;
//!
//! # fn main() -> Result<(), ztext::ParseError> {
//! let mut ctx = ZText::new();
//! let head = ctx.parse("{{name$ World}}: Hello, {{name$}}!")?;
//! assert_eq!(ctx.eval(head), "World: Hello, World!");
//! # Ok(())
//! # }
//! ```
//!
//! Token delimiters can be escaped as `\{{` and `\}}` to render literally.
//! Evaluation never fails: unknown variables and unregistered commands
//! render as the empty string.  Parse failures return a [`ParseError`]
//! carrying a stable error code and the byte offset of the problem;
//! [`ParseError::report`] renders a caret diagnostic against the source.
//!
//! Commands receive the context and their own element, so they can read
//! properties, evaluate their content, and even parse further text:
//!
//! ```
//! use ztext::ZText;
//!
//! # fn main() -> Result<(), ztext::ParseError> {
//! let mut ctx = ZText::new();
//! ctx.command_set("shout", |ctx, element| {
//!     match ctx.element_command_content(element) {
//!         Ok(Some(content)) => ctx.eval(content).to_uppercase(),
//!         _ => String::new(),
//!     }
//! });
//! let head = ctx.parse("{{shout quiet words}}")?;
//! assert_eq!(ctx.eval(head), "QUIET WORDS");
//! # Ok(())
//! # }
//! ```

mod context;
mod element;
mod error;
mod eval;
mod parse;
mod scan;

pub use context::{CommandFn, ZText};
pub use element::{ElementId, ElementKind, PropertyMap};
pub use error::{ParseError, ZTextError};
pub use parse::{parse_map, parse_map_range};

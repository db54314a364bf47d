//! Page Selection
//!
//! Parses human page-range expressions (`"1-5,7,10-12"`, `"all"`) into a
//! normalized set of 0-indexed page numbers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scriptorium_server::pages::PageSelection;
//!
//! let selection = PageSelection::parse("1-3,5");
//! assert_eq!(selection.resolve(10), vec![0, 1, 2, 4]);
//! assert_eq!(selection.to_string(), "1-3,5");
//! ```

mod selection;

pub use selection::{PageSelection, SelectionReport};

//! Data collaborator contract and dataset splits for longtail.
//!
//! The training loop consumes [`SplitFrame`]s: one row per `(date,
//! instrument)` pair, flattened window features and a multi-horizon label
//! vector. Frames come from any [`DataProvider`]; two are included.
//!
//! ```
//! use longtail_data::{DataProvider, InMemoryProvider, Split, SplitFrame};
//!
//! let index = vec![
//!     ("2020-01-02".to_string(), "SH600000".to_string()),
//!     ("2020-01-02".to_string(), "SH600004".to_string()),
//!     ("2020-01-03".to_string(), "SH600000".to_string()),
//! ];
//! let frame = SplitFrame::new(
//!     index,
//!     vec![0.1, 0.2, 0.3],
//!     1,
//!     vec![0.01, f32::NAN, -0.02],
//!     vec!["LABEL0".to_string()],
//! )
//! .unwrap();
//! let provider = InMemoryProvider::new().with_split(Split::Train, frame);
//!
//! let train = provider.prepare(Split::Train).unwrap().clean(0).unwrap();
//! assert_eq!(train.len(), 2);
//! assert_eq!(train.daily_groups().counts(), &[1, 1]);
//! ```
//!
//! # Modules
//!
//! - [`frame`] - [`SplitFrame`], [`Split`] and row cleaning
//! - [`groups`] - [`DailyGroups`], same-day row runs used by per-day metrics
//! - [`provider`] - The [`DataProvider`] trait and [`InMemoryProvider`]
//! - [`csv_source`] - [`CsvProvider`], one CSV file per split

pub mod csv_source;
pub mod error;
pub mod frame;
pub mod groups;
pub mod provider;

pub use csv_source::{read_frame, CsvProvider};
pub use error::{DataError, DataResult};
pub use frame::{RowKey, Split, SplitFrame};
pub use groups::DailyGroups;
pub use provider::{DataProvider, InMemoryProvider};

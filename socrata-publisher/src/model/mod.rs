//! The dataset model: views, columns, rows and the shapes exchanged with the service.

pub mod blueprint;
pub mod bulk;
pub mod column;
pub mod row;
pub mod view;

pub use blueprint::{Blueprint, BlueprintColumn};
pub use bulk::BulkResult;
pub use column::Column;
pub use row::{NewRow, Row, rows_from_records};
pub use view::{RESERVED_FIELD_NAMES, View};

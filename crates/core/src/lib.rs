// Shared plain types for the planbook engine and its clients.

pub mod key;
pub mod option;
pub mod value;

pub use key::FieldKey;
pub use option::OptionItem;
pub use value::{FieldKind, FieldValue, ValidationStatus, ValueOrigin};

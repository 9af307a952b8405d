//! Data structures of the query layer.

pub mod data;
pub mod event;
pub mod ontology;
pub mod options;
pub mod query;
pub mod region;
pub mod values;

pub use data::{Variant, VariantType};
pub use event::{Event, EventType};
pub use options::{EngineConfig, QueryOptions, VariantField};
pub use query::{Query, QueryParam, QueryValue};
pub use region::Region;
pub use values::{
    Comparator, Describe, KeyOpValue, KeyValues, NegatableValue, OpValue, ParsedQuery,
    QueryOperation, ResourceId, Values,
};

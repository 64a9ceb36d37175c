//! Composable per-type size functions.

use std::fmt;
use std::sync::Arc;

use crate::sizeof::reflect::{CharCount, Count, Elements, Entries, FieldPath, TypeDesc};

/// A function `value -> bytes`, composed from a small set of primitives.
///
/// Operators are built once per type by the
/// [`SizeEstimator`](crate::sizeof::SizeEstimator) and evaluated per instance.
pub enum SizeofOperator {
    /// Same cost for every instance
    Constant(u64),
    /// Sum of the parts
    Sum(Vec<Arc<SizeofOperator>>),
    /// Cost of one (possibly absent) field
    FieldOf {
        field: FieldPath,
        operator: Arc<SizeofOperator>,
    },
    /// `overhead + chars`
    Text { overhead: u64, chars: CharCount },
    /// `header + len * width`
    ArrayOfPrimitive { header: u64, width: u64, count: Count },
    /// `header + len * element`
    ArrayOfFixed { header: u64, element: u64, count: Count },
    /// `header + sum(reference + element(e))`
    ArrayOfDynamic {
        header: u64,
        reference: u64,
        element: Arc<SizeofOperator>,
        elements: Elements,
    },
    /// `header + len * element`, where `element` already includes the
    /// per-entry bookkeeping
    CollectionOfFixed { header: u64, element: u64, count: Count },
    /// `header + sum(entry + element(e))`
    CollectionOfDynamic {
        header: u64,
        entry: u64,
        element: Arc<SizeofOperator>,
        elements: Elements,
    },
    /// `header + sum(entry + key(k) + value(v))`
    MapOfDynamic {
        header: u64,
        entry: u64,
        key: Arc<SizeofOperator>,
        value: Arc<SizeofOperator>,
        entries: Entries,
    },
    /// Resolved from the value's runtime type at evaluation time
    Runtime,
    /// Operator of a type whose resolution was still in progress when this
    /// operator was composed; looked up at evaluation time
    Deferred(TypeDesc),
}

impl SizeofOperator {
    pub fn constant(bytes: u64) -> Arc<Self> {
        Arc::new(SizeofOperator::Constant(bytes))
    }

    /// The constant cost, if this operator does not depend on the instance.
    pub fn as_constant(&self) -> Option<u64> {
        match self {
            SizeofOperator::Constant(bytes) => Some(*bytes),
            _ => None,
        }
    }
}

impl fmt::Debug for SizeofOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeofOperator::Constant(bytes) => write!(f, "constant({bytes})"),
            SizeofOperator::Sum(parts) => f.debug_tuple("sum").field(parts).finish(),
            SizeofOperator::FieldOf { field, operator } => {
                write!(f, "field_of({field:?}, {operator:?})")
            }
            SizeofOperator::Text { overhead, .. } => write!(f, "text({overhead})"),
            SizeofOperator::ArrayOfPrimitive { width, .. } => {
                write!(f, "array_of_primitive({width})")
            }
            SizeofOperator::ArrayOfFixed { element, .. } => write!(f, "array_of_fixed({element})"),
            SizeofOperator::ArrayOfDynamic { element, .. } => {
                write!(f, "array_of_dynamic({element:?})")
            }
            SizeofOperator::CollectionOfFixed { element, .. } => {
                write!(f, "collection_of_fixed({element})")
            }
            SizeofOperator::CollectionOfDynamic { element, .. } => {
                write!(f, "collection_of_dynamic({element:?})")
            }
            SizeofOperator::MapOfDynamic { key, value, .. } => {
                write!(f, "map_of_dynamic({key:?}, {value:?})")
            }
            SizeofOperator::Runtime => f.write_str("runtime"),
            SizeofOperator::Deferred(desc) => write!(f, "deferred({desc:?})"),
        }
    }
}

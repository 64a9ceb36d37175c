//! Size Estimation Module
//!
//! A pessimistic, memoized estimate of how many bytes a value keeps alive.
//! Used by reporting and cap enforcement, never by a cache's own eviction.
//!
//! For each type the estimator first tries to find a fixed size. Types that
//! have one are sized by a constant; all others get a [`SizeofOperator`]
//! composed from their [`Layout`] and evaluated per instance. Both results
//! are memoized per type. A type reached again while it is still being
//! resolved is treated as not fixed, which bounds the resolution of
//! self-referential type graphs.

mod impls;
mod operator;
mod reflect;

use std::any::TypeId;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};

pub use operator::SizeofOperator;
pub use reflect::{
    downcast, Accessor, CharCount, Composite, Count, Elements, Entries, Field, FieldPath,
    Introspect, Layout, Reflect, TypeDesc,
};

// == Sizeof Config ==
/// Byte costs the estimator charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeofConfig {
    /// Cost of every composite object; also the fallback estimate
    pub object_header: u64,
    /// Cost of every array or collection object
    pub array_header: u64,
    /// Extra cost of a non-primitive field or array slot
    pub reference: u64,
    /// Bookkeeping cost per sequence element
    pub collection_entry: u64,
    /// Bookkeeping cost per map entry
    pub map_entry: u64,
    /// Fixed cost of a string-like value, on top of one byte per char
    pub text_overhead: u64,
    /// Nested composite or container values at which evaluation gives up
    pub max_depth: usize,
}

impl Default for SizeofConfig {
    fn default() -> Self {
        Self {
            object_header: 16,
            array_header: 16,
            reference: 4,
            collection_entry: 8,
            map_entry: 12,
            text_overhead: 52,
            max_depth: 1024,
        }
    }
}

impl SizeofConfig {
    pub fn with_object_header(object_header: u64) -> Self {
        Self {
            object_header,
            ..Self::default()
        }
    }
}

// == Size Estimator ==
/// Memoizing object-size estimator. Construct one per process and share it.
pub struct SizeEstimator {
    config: SizeofConfig,
    /// Fixed size per type, None = not statically fixed
    fixed: DashMap<TypeId, Option<u64>>,
    /// Per-instance operator per type
    operators: DashMap<TypeId, Arc<SizeofOperator>>,
}

impl Default for SizeEstimator {
    fn default() -> Self {
        Self::new(SizeofConfig::default())
    }
}

impl fmt::Debug for SizeEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeEstimator")
            .field("config", &self.config)
            .field("fixed_types", &self.fixed.len())
            .field("operator_types", &self.operators.len())
            .finish()
    }
}

impl SizeEstimator {
    pub fn new(config: SizeofConfig) -> Self {
        Self {
            config,
            fixed: DashMap::new(),
            operators: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SizeofConfig {
        &self.config
    }

    // == Sizeof ==
    /// Estimated bytes kept alive by `value`.
    ///
    /// Never fails: if the object graph cannot be sized the failure is
    /// logged and the object header size is returned instead.
    pub fn sizeof(&self, value: &dyn Reflect) -> u64 {
        let desc = value.type_desc();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let operator = self.operator_for(&desc);
            self.evaluate(&operator, value, 0)
        }));

        match outcome {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => {
                warn!(ty = desc.name(), error = %err, "falling back to header size");
                self.config.object_header
            }
            Err(_) => {
                warn!(ty = desc.name(), "size estimation panicked, falling back to header size");
                self.config.object_header
            }
        }
    }

    /// Like [`sizeof`](Self::sizeof), with an absent value costing nothing.
    pub fn sizeof_opt(&self, value: Option<&dyn Reflect>) -> u64 {
        value.map_or(0, |value| self.sizeof(value))
    }

    // == Fixed Size ==
    /// Size shared by every instance of the type, None if it varies.
    pub fn fixed_size(&self, desc: &TypeDesc) -> Option<u64> {
        self.resolve_fixed(desc, &mut Vec::new())
    }

    fn resolve_fixed(&self, desc: &TypeDesc, resolving: &mut Vec<TypeId>) -> Option<u64> {
        if let Some(known) = self.fixed.get(&desc.id()) {
            return *known;
        }
        if resolving.contains(&desc.id()) {
            // a type on a cycle of its own type graph cannot be fixed
            return None;
        }

        resolving.push(desc.id());
        let result = self.compute_fixed(desc, resolving);
        resolving.pop();

        self.fixed.insert(desc.id(), result);
        result
    }

    fn compute_fixed(&self, desc: &TypeDesc, resolving: &mut Vec<TypeId>) -> Option<u64> {
        match desc.layout() {
            Layout::Primitive(width) => Some(width),
            Layout::Opaque(bytes) => Some(self.config.object_header + bytes),
            Layout::Shared => Some(0),
            Layout::Indirect { target, .. } => self.resolve_fixed(&target, resolving),
            Layout::Text(_)
            | Layout::Array { .. }
            | Layout::Sequence { .. }
            | Layout::Map { .. }
            | Layout::Dynamic { .. } => None,
            Layout::Composite(composite) => {
                let mut total = self.config.object_header;
                for field in composite.instance_fields() {
                    total += self.resolve_fixed(&field.ty, resolving)?;
                    if !is_primitive(&field.ty) {
                        total += self.config.reference;
                    }
                }
                Some(total)
            }
        }
    }

    // == Operators ==
    /// The per-instance operator of a type.
    pub fn operator_for(&self, desc: &TypeDesc) -> Arc<SizeofOperator> {
        self.resolve_operator(desc, &mut Vec::new())
    }

    fn resolve_operator(&self, desc: &TypeDesc, resolving: &mut Vec<TypeId>) -> Arc<SizeofOperator> {
        if let Some(known) = self.operators.get(&desc.id()) {
            return Arc::clone(&known);
        }
        if resolving.contains(&desc.id()) {
            warn!(ty = desc.name(), "recursive type graph, deferring operator to evaluation");
            return Arc::new(SizeofOperator::Deferred(*desc));
        }

        resolving.push(desc.id());
        let operator = self.compose(desc, resolving);
        resolving.pop();

        debug!(ty = desc.name(), operator = ?operator, "composed sizeof operator");
        self.operators.insert(desc.id(), Arc::clone(&operator));
        operator
    }

    fn compose(&self, desc: &TypeDesc, resolving: &mut Vec<TypeId>) -> Arc<SizeofOperator> {
        if let Some(bytes) = self.resolve_fixed(desc, &mut Vec::new()) {
            return SizeofOperator::constant(bytes);
        }

        let config = &self.config;
        let operator = match desc.layout() {
            Layout::Text(chars) => SizeofOperator::Text {
                overhead: config.text_overhead,
                chars,
            },
            Layout::Indirect { target, get } => SizeofOperator::FieldOf {
                field: FieldPath {
                    name: target.name(),
                    ty: target,
                    path: vec![get],
                },
                operator: self.resolve_operator(&target, resolving),
            },
            Layout::Dynamic { get } => SizeofOperator::FieldOf {
                field: FieldPath {
                    name: "dyn",
                    ty: *desc,
                    path: vec![get],
                },
                operator: Arc::new(SizeofOperator::Runtime),
            },
            Layout::Array {
                element,
                count,
                elements,
            } => match element.layout() {
                Layout::Primitive(width) => SizeofOperator::ArrayOfPrimitive {
                    header: config.array_header,
                    width,
                    count,
                },
                _ => match self.resolve_fixed(&element, &mut Vec::new()) {
                    Some(bytes) => SizeofOperator::ArrayOfFixed {
                        header: config.array_header,
                        element: bytes + config.reference,
                        count,
                    },
                    None => SizeofOperator::ArrayOfDynamic {
                        header: config.array_header,
                        reference: config.reference,
                        element: self.resolve_operator(&element, resolving),
                        elements,
                    },
                },
            },
            Layout::Sequence {
                element,
                count,
                elements,
            } => match self.resolve_fixed(&element, &mut Vec::new()) {
                Some(bytes) => SizeofOperator::CollectionOfFixed {
                    header: config.array_header,
                    element: config.collection_entry + bytes,
                    count,
                },
                None => SizeofOperator::CollectionOfDynamic {
                    header: config.array_header,
                    entry: config.collection_entry,
                    element: self.resolve_operator(&element, resolving),
                    elements,
                },
            },
            Layout::Map {
                key,
                value,
                entries,
                ..
            } => SizeofOperator::MapOfDynamic {
                header: config.array_header,
                entry: config.map_entry,
                key: self.resolve_operator(&key, resolving),
                value: self.resolve_operator(&value, resolving),
                entries,
            },
            Layout::Composite(composite) => {
                let mut constant = config.object_header;
                let mut parts = Vec::new();
                for field in composite.instance_fields() {
                    if !is_primitive(&field.ty) {
                        constant += config.reference;
                    }
                    match self.resolve_fixed(&field.ty, &mut Vec::new()) {
                        Some(bytes) => constant += bytes,
                        None => {
                            let operator = self.resolve_operator(&field.ty, resolving);
                            parts.push(Arc::new(SizeofOperator::FieldOf { field, operator }));
                        }
                    }
                }
                parts.insert(0, SizeofOperator::constant(constant));
                SizeofOperator::Sum(parts)
            }
            // fixed layouts were handled above
            Layout::Primitive(_) | Layout::Opaque(_) | Layout::Shared => {
                SizeofOperator::Constant(0)
            }
        };
        Arc::new(operator)
    }

    // == Evaluation ==
    fn evaluate(&self, operator: &SizeofOperator, value: &dyn Reflect, depth: usize) -> Result<u64> {
        if depth > self.config.max_depth {
            return Err(CacheError::EstimationFailure(format!(
                "object graph nested deeper than {} values",
                self.config.max_depth
            )));
        }

        let bytes = match operator {
            SizeofOperator::Constant(bytes) => *bytes,
            SizeofOperator::Sum(parts) => {
                let mut total = 0;
                // a composite value: the only step that nests one level
                for part in parts {
                    total += self.evaluate(part, value, depth + 1)?;
                }
                total
            }
            SizeofOperator::FieldOf { field, operator } => match field.resolve(value) {
                Some(inner) => self.evaluate(operator, inner, depth)?,
                None => 0,
            },
            SizeofOperator::Text { overhead, chars } => overhead + chars(value) as u64,
            SizeofOperator::ArrayOfPrimitive { header, width, count } => {
                header + count(value) as u64 * width
            }
            SizeofOperator::ArrayOfFixed { header, element, count }
            | SizeofOperator::CollectionOfFixed { header, element, count } => {
                header + count(value) as u64 * element
            }
            SizeofOperator::ArrayOfDynamic {
                header,
                reference,
                element,
                elements,
            } => {
                let mut total = *header;
                for item in elements(value) {
                    total += reference + self.evaluate(element, item, depth + 1)?;
                }
                total
            }
            SizeofOperator::CollectionOfDynamic {
                header,
                entry,
                element,
                elements,
            } => {
                let mut total = *header;
                for item in elements(value) {
                    total += entry + self.evaluate(element, item, depth + 1)?;
                }
                total
            }
            SizeofOperator::MapOfDynamic {
                header,
                entry,
                key,
                value: value_operator,
                entries,
            } => {
                let mut total = *header;
                for (k, v) in entries(value) {
                    total += entry
                        + self.evaluate(key, k, depth + 1)?
                        + self.evaluate(value_operator, v, depth + 1)?;
                }
                total
            }
            SizeofOperator::Runtime => {
                let operator = self.operator_for(&value.type_desc());
                self.evaluate(&operator, value, depth)?
            }
            SizeofOperator::Deferred(desc) => {
                let operator = self.operator_for(desc);
                if matches!(*operator, SizeofOperator::Deferred(_)) {
                    return Err(CacheError::EstimationFailure(format!(
                        "operator of {} never completed",
                        desc.name()
                    )));
                }
                self.evaluate(&operator, value, depth)?
            }
        };
        Ok(bytes)
    }
}

fn is_primitive(desc: &TypeDesc) -> bool {
    matches!(desc.layout(), Layout::Primitive(_))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect_struct;
    use std::collections::{HashMap, HashSet};
    use std::sync::Barrier;
    use std::thread;

    struct Point {
        x: i32,
        y: i64,
    }
    reflect_struct!(Point { x: i32, y: i64 });

    struct Labelled {
        point: Point,
        label: String,
    }
    reflect_struct!(Labelled { point: Point, label: String });

    struct Node {
        value: i64,
        next: Option<Box<Node>>,
    }
    reflect_struct!(Node { value: i64, next: Option<Box<Node>> });

    struct Parent {
        child: Option<Box<Child>>,
    }
    struct Child {
        parent: Option<Box<Parent>>,
        weight: f64,
    }
    reflect_struct!(Parent { child: Option<Box<Child>> });
    reflect_struct!(Child { parent: Option<Box<Parent>>, weight: f64 });

    struct Audited {
        created: i64,
    }
    struct Grid {
        audit: Audited,
        rows: Vec<i32>,
    }
    reflect_struct!(Audited { created: i64 });
    reflect_struct!(Grid: audit as Audited { rows: Vec<i32> });

    struct Envelope {
        payload: Box<dyn Reflect>,
    }
    reflect_struct!(Envelope { payload: Box<dyn Reflect> });

    struct Exploding;
    fn explode(_: &dyn Reflect) -> Option<&dyn Reflect> {
        panic!("accessor failure")
    }
    impl Introspect for Exploding {
        fn layout() -> Layout {
            Layout::Composite(Composite::new().field::<String>("boom", explode))
        }
    }

    fn estimator() -> SizeEstimator {
        SizeEstimator::default()
    }

    fn list(len: usize) -> Node {
        let mut head = Node {
            value: 0,
            next: None,
        };
        for i in 1..len {
            head = Node {
                value: i as i64,
                next: Some(Box::new(head)),
            };
        }
        head
    }

    #[test]
    fn test_absent_value_is_free() {
        assert_eq!(estimator().sizeof_opt(None), 0);
    }

    #[test]
    fn test_primitives() {
        let sizeof = estimator();
        assert_eq!(sizeof.sizeof(&1i32), 4);
        assert_eq!(sizeof.sizeof(&true), 4);
        assert_eq!(sizeof.sizeof(&1u64), 8);
        assert_eq!(sizeof.sizeof(&1.5f64), 8);
    }

    #[test]
    fn test_text_is_overhead_plus_chars() {
        let sizeof = estimator();
        assert_eq!(sizeof.sizeof(&String::new()), 52);
        assert_eq!(sizeof.sizeof(&"abcd".to_string()), 56);
    }

    #[test]
    fn test_fixed_composite() {
        let sizeof = estimator();
        // header + i32 + i64, primitives carry no reference overhead
        assert_eq!(sizeof.fixed_size(&TypeDesc::of::<Point>()), Some(16 + 4 + 8));
        assert_eq!(sizeof.sizeof(&Point { x: 1, y: 2 }), 28);
    }

    #[test]
    fn test_dynamic_composite() {
        let sizeof = estimator();
        assert_eq!(sizeof.fixed_size(&TypeDesc::of::<Labelled>()), None);

        let value = Labelled {
            point: Point { x: 0, y: 0 },
            label: "abc".to_string(),
        };
        // header + (point 28 + ref 4) + (ref 4 + text 52 + 3)
        assert_eq!(sizeof.sizeof(&value), 16 + 28 + 4 + 4 + 55);
    }

    #[test]
    fn test_inherited_fields_share_one_header() {
        let sizeof = estimator();
        let grid = Grid {
            audit: Audited { created: 1 },
            rows: vec![1, 2, 3],
        };
        // header + created 8 + (ref 4 + array header 16 + 3 * 4)
        assert_eq!(sizeof.sizeof(&grid), 16 + 8 + 4 + 16 + 12);
    }

    #[test]
    fn test_arrays() {
        let sizeof = estimator();
        assert_eq!(sizeof.sizeof(&vec![0u8; 10]), 16 + 40);
        assert_eq!(sizeof.sizeof(&[0i64; 3]), 16 + 24);

        let points = vec![Point { x: 0, y: 0 }, Point { x: 1, y: 1 }];
        assert_eq!(sizeof.sizeof(&points), 16 + 2 * (28 + 4));

        let names = vec!["a".to_string(), "bb".to_string()];
        assert_eq!(sizeof.sizeof(&names), 16 + (4 + 53) + (4 + 54));
    }

    #[test]
    fn test_collections_and_maps() {
        let sizeof = estimator();

        let set: HashSet<i64> = [1, 2, 3].into_iter().collect();
        assert_eq!(sizeof.sizeof(&set), 16 + 3 * (8 + 8));

        let mut map = HashMap::new();
        map.insert("k".to_string(), 1i32);
        assert_eq!(sizeof.sizeof(&map), 16 + 12 + 53 + 4);
    }

    #[test]
    fn test_option_and_box() {
        let sizeof = estimator();
        assert_eq!(sizeof.sizeof(&Some(5i64)), 8);
        assert_eq!(sizeof.sizeof(&None::<String>), 0);
        assert_eq!(sizeof.sizeof(&Some("ab".to_string())), 54);
        assert_eq!(sizeof.sizeof(&Box::new(Point { x: 0, y: 0 })), 28);
    }

    #[test]
    fn test_trait_objects_resolve_runtime_type() {
        let sizeof = estimator();
        let envelope = Envelope {
            payload: Box::new("xyz".to_string()),
        };
        // header + ref + text of the concrete payload
        assert_eq!(sizeof.sizeof(&envelope), 16 + 4 + 55);

        let envelope = Envelope {
            payload: Box::new(7u64),
        };
        assert_eq!(sizeof.sizeof(&envelope), 16 + 4 + 8);
    }

    #[test]
    fn test_shared_metadata_is_free() {
        let sizeof = estimator();
        assert_eq!(sizeof.sizeof(&TypeDesc::of::<Point>()), 0);
        assert_eq!(sizeof.sizeof(&"static"), 0);
    }

    #[test]
    fn test_self_referential_type_terminates() {
        let sizeof = estimator();
        assert_eq!(sizeof.fixed_size(&TypeDesc::of::<Node>()), None);

        let single = sizeof.sizeof(&list(1));
        let triple = sizeof.sizeof(&list(3));
        // header + value 8 + ref 4 per node
        assert_eq!(single, 28);
        assert_eq!(triple, 3 * 28);
        assert_eq!(sizeof.sizeof(&list(3)), triple);
    }

    #[test]
    fn test_mutually_recursive_types_terminate() {
        let sizeof = estimator();
        assert_eq!(sizeof.fixed_size(&TypeDesc::of::<Parent>()), None);
        assert_eq!(sizeof.fixed_size(&TypeDesc::of::<Child>()), None);

        let parent = Parent {
            child: Some(Box::new(Child {
                parent: Some(Box::new(Parent { child: None })),
                weight: 1.0,
            })),
        };
        // parent: header + ref, child: header + ref + f64, inner parent: header + ref
        assert_eq!(sizeof.sizeof(&parent), 20 + 28 + 20);
    }

    #[test]
    fn test_resolution_order_does_not_change_results() {
        let child = Child {
            parent: Some(Box::new(Parent { child: None })),
            weight: 2.0,
        };

        let first = estimator();
        first.sizeof(&Parent { child: None });
        let a = first.sizeof(&child);

        let second = estimator();
        let b = second.sizeof(&child);

        assert_eq!(a, b);
    }

    #[test]
    fn test_deep_graph_falls_back_to_header() {
        let sizeof = SizeEstimator::new(SizeofConfig {
            max_depth: 8,
            ..SizeofConfig::default()
        });
        assert_eq!(sizeof.sizeof(&list(50)), 16);
    }

    #[test]
    fn test_long_list_within_default_depth() {
        // each node is one composite level, however many accessors lead to it
        assert_eq!(estimator().sizeof(&list(500)), 500 * 28);
    }

    #[test]
    fn test_panicking_accessor_falls_back_to_header() {
        let sizeof = SizeEstimator::new(SizeofConfig::with_object_header(24));
        assert_eq!(sizeof.sizeof(&Exploding), 24);
    }

    #[test]
    fn test_repeated_calls_agree() {
        let sizeof = estimator();
        let value = Labelled {
            point: Point { x: 3, y: 4 },
            label: "same".to_string(),
        };
        let first = sizeof.sizeof(&value);
        for _ in 0..5 {
            assert_eq!(sizeof.sizeof(&value), first);
        }
    }

    #[test]
    fn test_concurrent_population_converges() {
        let sizeof = Arc::new(estimator());
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let sizeof = Arc::clone(&sizeof);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    sizeof.sizeof(&list(4))
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 4 * 28);
        }
    }

    #[test]
    fn test_operator_shapes() {
        let sizeof = estimator();
        let point = sizeof.operator_for(&TypeDesc::of::<Point>());
        assert_eq!(point.as_constant(), Some(28));

        let node = sizeof.operator_for(&TypeDesc::of::<Node>());
        assert!(node.as_constant().is_none());
        assert!(format!("{node:?}").contains("deferred"));
    }
}

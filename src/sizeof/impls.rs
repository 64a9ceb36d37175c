//! [`Introspect`] implementations for std and chrono types.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::sizeof::reflect::{downcast, Introspect, Layout, Reflect, TypeDesc};

macro_rules! known_layout {
    ($layout:expr; $($ty:ty),+ $(,)?) => {
        $(
            impl Introspect for $ty {
                fn layout() -> Layout {
                    $layout
                }
            }
        )+
    };
}

known_layout!(Layout::Primitive(4); i8, i16, i32, u8, u16, u32, f32, bool, char);
known_layout!(Layout::Primitive(8); i64, u64, f64, isize, usize);
known_layout!(Layout::Primitive(16); i128, u128);
known_layout!(Layout::Shared; (), &'static str, TypeId, TypeDesc);
known_layout!(Layout::Opaque(4); NaiveDate);
known_layout!(Layout::Opaque(12); NaiveDateTime, DateTime<Utc>, std::time::Duration);

// == Text ==

fn string_chars(value: &dyn Reflect) -> usize {
    downcast::<String>(value).map_or(0, |s| s.chars().count())
}

fn boxed_str_chars(value: &dyn Reflect) -> usize {
    downcast::<Box<str>>(value).map_or(0, |s| s.chars().count())
}

fn arc_str_chars(value: &dyn Reflect) -> usize {
    downcast::<Arc<str>>(value).map_or(0, |s| s.chars().count())
}

impl Introspect for String {
    fn layout() -> Layout {
        Layout::Text(string_chars)
    }
}

impl Introspect for Box<str> {
    fn layout() -> Layout {
        Layout::Text(boxed_str_chars)
    }
}

impl Introspect for Arc<str> {
    fn layout() -> Layout {
        Layout::Text(arc_str_chars)
    }
}

// == Indirection ==

fn option_get<T: Introspect>(value: &dyn Reflect) -> Option<&dyn Reflect> {
    downcast::<Option<T>>(value)?
        .as_ref()
        .map(|inner| inner as &dyn Reflect)
}

fn box_get<T: Introspect>(value: &dyn Reflect) -> Option<&dyn Reflect> {
    downcast::<Box<T>>(value).map(|inner| &**inner as &dyn Reflect)
}

fn arc_get<T: Introspect>(value: &dyn Reflect) -> Option<&dyn Reflect> {
    downcast::<Arc<T>>(value).map(|inner| &**inner as &dyn Reflect)
}

impl<T: Introspect> Introspect for Option<T> {
    fn layout() -> Layout {
        Layout::Indirect {
            target: TypeDesc::of::<T>(),
            get: option_get::<T>,
        }
    }
}

impl<T: Introspect> Introspect for Box<T> {
    fn layout() -> Layout {
        Layout::Indirect {
            target: TypeDesc::of::<T>(),
            get: box_get::<T>,
        }
    }
}

// Shared pointers are counted as owned: a pessimistic estimate.
impl<T: Introspect> Introspect for Arc<T> {
    fn layout() -> Layout {
        Layout::Indirect {
            target: TypeDesc::of::<T>(),
            get: arc_get::<T>,
        }
    }
}

// == Trait Objects ==

fn boxed_dyn_get(value: &dyn Reflect) -> Option<&dyn Reflect> {
    downcast::<Box<dyn Reflect>>(value).map(|inner| &**inner)
}

fn arc_dyn_get(value: &dyn Reflect) -> Option<&dyn Reflect> {
    downcast::<Arc<dyn Reflect>>(value).map(|inner| &**inner)
}

impl Introspect for Box<dyn Reflect> {
    fn layout() -> Layout {
        Layout::Dynamic { get: boxed_dyn_get }
    }
}

impl Introspect for Arc<dyn Reflect> {
    fn layout() -> Layout {
        Layout::Dynamic { get: arc_dyn_get }
    }
}

// == Arrays ==

fn slice_elements<T: Introspect>(items: &[T]) -> Vec<&dyn Reflect> {
    items.iter().map(|item| item as &dyn Reflect).collect()
}

fn vec_count<T: Introspect>(value: &dyn Reflect) -> usize {
    downcast::<Vec<T>>(value).map_or(0, Vec::len)
}

fn vec_elements<T: Introspect>(value: &dyn Reflect) -> Vec<&dyn Reflect> {
    downcast::<Vec<T>>(value).map_or_else(Vec::new, |items| slice_elements(items))
}

fn boxed_slice_count<T: Introspect>(value: &dyn Reflect) -> usize {
    downcast::<Box<[T]>>(value).map_or(0, |items| items.len())
}

fn boxed_slice_elements<T: Introspect>(value: &dyn Reflect) -> Vec<&dyn Reflect> {
    downcast::<Box<[T]>>(value).map_or_else(Vec::new, |items| slice_elements(items))
}

fn array_count<T: Introspect, const N: usize>(value: &dyn Reflect) -> usize {
    downcast::<[T; N]>(value).map_or(0, |_| N)
}

fn array_elements<T: Introspect, const N: usize>(value: &dyn Reflect) -> Vec<&dyn Reflect> {
    downcast::<[T; N]>(value).map_or_else(Vec::new, |items| slice_elements(items))
}

impl<T: Introspect> Introspect for Vec<T> {
    fn layout() -> Layout {
        Layout::Array {
            element: TypeDesc::of::<T>(),
            count: vec_count::<T>,
            elements: vec_elements::<T>,
        }
    }
}

impl<T: Introspect> Introspect for Box<[T]> {
    fn layout() -> Layout {
        Layout::Array {
            element: TypeDesc::of::<T>(),
            count: boxed_slice_count::<T>,
            elements: boxed_slice_elements::<T>,
        }
    }
}

impl<T: Introspect, const N: usize> Introspect for [T; N] {
    fn layout() -> Layout {
        Layout::Array {
            element: TypeDesc::of::<T>(),
            count: array_count::<T, N>,
            elements: array_elements::<T, N>,
        }
    }
}

// == Sequences ==

macro_rules! sequence_layout {
    ($count:ident, $elements:ident, $coll:ident $(, $bound:path)*) => {
        fn $count<T: Introspect $(+ $bound)*>(value: &dyn Reflect) -> usize {
            downcast::<$coll<T>>(value).map_or(0, |items| items.len())
        }

        fn $elements<T: Introspect $(+ $bound)*>(value: &dyn Reflect) -> Vec<&dyn Reflect> {
            downcast::<$coll<T>>(value).map_or_else(Vec::new, |items| {
                items.iter().map(|item| item as &dyn Reflect).collect()
            })
        }

        impl<T: Introspect $(+ $bound)*> Introspect for $coll<T> {
            fn layout() -> Layout {
                Layout::Sequence {
                    element: TypeDesc::of::<T>(),
                    count: $count::<T>,
                    elements: $elements::<T>,
                }
            }
        }
    };
}

sequence_layout!(deque_count, deque_elements, VecDeque);
sequence_layout!(list_count, list_elements, LinkedList);
sequence_layout!(hash_set_count, hash_set_elements, HashSet, Eq, Hash);
sequence_layout!(btree_set_count, btree_set_elements, BTreeSet, Ord);

// == Maps ==

macro_rules! map_layout {
    ($count:ident, $entries:ident, $map:ident $(, $bound:path)*) => {
        fn $count<K: Introspect $(+ $bound)*, V: Introspect>(value: &dyn Reflect) -> usize {
            downcast::<$map<K, V>>(value).map_or(0, |map| map.len())
        }

        fn $entries<K: Introspect $(+ $bound)*, V: Introspect>(
            value: &dyn Reflect,
        ) -> Vec<(&dyn Reflect, &dyn Reflect)> {
            downcast::<$map<K, V>>(value).map_or_else(Vec::new, |map| {
                map.iter()
                    .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                    .collect()
            })
        }

        impl<K: Introspect $(+ $bound)*, V: Introspect> Introspect for $map<K, V> {
            fn layout() -> Layout {
                Layout::Map {
                    key: TypeDesc::of::<K>(),
                    value: TypeDesc::of::<V>(),
                    count: $count::<K, V>,
                    entries: $entries::<K, V>,
                }
            }
        }
    };
}

map_layout!(hash_map_count, hash_map_entries, HashMap, Eq, Hash);
map_layout!(btree_map_count, btree_map_entries, BTreeMap, Ord);

// == Tuples ==

fn pair_first<A: Introspect, B: Introspect>(value: &dyn Reflect) -> Option<&dyn Reflect> {
    downcast::<(A, B)>(value).map(|pair| &pair.0 as &dyn Reflect)
}

fn pair_second<A: Introspect, B: Introspect>(value: &dyn Reflect) -> Option<&dyn Reflect> {
    downcast::<(A, B)>(value).map(|pair| &pair.1 as &dyn Reflect)
}

impl<A: Introspect, B: Introspect> Introspect for (A, B) {
    fn layout() -> Layout {
        Layout::Composite(
            crate::sizeof::Composite::new()
                .field::<A>("0", pair_first::<A, B>)
                .field::<B>("1", pair_second::<A, B>),
        )
    }
}

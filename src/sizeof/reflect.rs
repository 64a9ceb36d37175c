//! Opt-in runtime type introspection.
//!
//! Rust has no field enumeration at runtime, so types describe their own
//! shape once through [`Introspect::layout`]. Every `Introspect` type is
//! also [`Reflect`], the object-safe half that exposes the runtime type of a
//! value behind `&dyn Reflect`.

use std::any::{Any, TypeId};
use std::fmt;

/// Reads a child value out of its parent. `None` means "absent", e.g. an
/// empty `Option` or a downcast that did not match.
pub type Accessor = fn(&dyn Reflect) -> Option<&dyn Reflect>;

/// Number of elements held by an array, sequence or map.
pub type Count = fn(&dyn Reflect) -> usize;

/// Borrowed elements of an array or sequence.
pub type Elements = fn(&dyn Reflect) -> Vec<&dyn Reflect>;

/// Borrowed key/value pairs of a map.
pub type Entries = fn(&dyn Reflect) -> Vec<(&dyn Reflect, &dyn Reflect)>;

/// Number of characters of a string-like value.
pub type CharCount = fn(&dyn Reflect) -> usize;

// == Reflect ==
/// Object-safe access to the runtime type of a value.
///
/// Implemented for every [`Introspect`] type; never implement it by hand.
pub trait Reflect: Any + Send + Sync + 'static {
    /// Descriptor of the value's concrete type.
    fn type_desc(&self) -> TypeDesc;

    fn as_any(&self) -> &dyn Any;
}

// == Introspect ==
/// Static description of a type's memory shape.
///
/// Plain structs usually derive this with [`reflect_struct!`](crate::reflect_struct).
pub trait Introspect: Any + Send + Sync + Sized {
    fn layout() -> Layout;
}

impl<T: Introspect> Reflect for T {
    fn type_desc(&self) -> TypeDesc {
        TypeDesc::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Downcasts a reflected value to its concrete type.
pub fn downcast<T: Introspect>(value: &dyn Reflect) -> Option<&T> {
    value.as_any().downcast_ref::<T>()
}

// == Type Descriptor ==
/// Identity of a type plus a way to obtain its [`Layout`].
#[derive(Clone, Copy)]
pub struct TypeDesc {
    id: TypeId,
    name: &'static str,
    layout: fn() -> Layout,
}

impl TypeDesc {
    pub fn of<T: Introspect>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            layout: T::layout,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn layout(&self) -> Layout {
        (self.layout)()
    }
}

impl PartialEq for TypeDesc {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDesc {}

impl fmt::Debug for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// == Layout ==
/// The capability a type exposes to the size estimator.
pub enum Layout {
    /// Scalar of the given width in bytes
    Primitive(u64),
    /// Fixed-size value object: one object header plus this many bytes
    Opaque(u64),
    /// Character data, sized as a per-instance overhead plus one byte per char
    Text(CharCount),
    /// Shared or static data not owned by the value (zero cost)
    Shared,
    /// Owning or optional pointer to a value of a statically known type
    Indirect { target: TypeDesc, get: Accessor },
    /// Contiguous buffer of elements
    Array {
        element: TypeDesc,
        count: Count,
        elements: Elements,
    },
    /// Node-based or hashed collection of elements
    Sequence {
        element: TypeDesc,
        count: Count,
        elements: Elements,
    },
    /// Associative container
    Map {
        key: TypeDesc,
        value: TypeDesc,
        count: Count,
        entries: Entries,
    },
    /// Value whose concrete type is only known at runtime (trait objects)
    Dynamic { get: Accessor },
    /// Struct with named fields
    Composite(Composite),
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Primitive(width) => write!(f, "Primitive({width})"),
            Layout::Opaque(bytes) => write!(f, "Opaque({bytes})"),
            Layout::Text(_) => f.write_str("Text"),
            Layout::Shared => f.write_str("Shared"),
            Layout::Indirect { target, .. } => write!(f, "Indirect({target:?})"),
            Layout::Array { element, .. } => write!(f, "Array({element:?})"),
            Layout::Sequence { element, .. } => write!(f, "Sequence({element:?})"),
            Layout::Map { key, value, .. } => write!(f, "Map({key:?}, {value:?})"),
            Layout::Dynamic { .. } => f.write_str("Dynamic"),
            Layout::Composite(composite) => composite.fmt(f),
        }
    }
}

// == Composite ==
/// Field list of a struct, optionally embedding a base struct whose fields
/// are flattened into this one.
#[derive(Default)]
pub struct Composite {
    base: Option<(TypeDesc, Accessor)>,
    fields: Vec<Field>,
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embeds `B`: its instance fields count as fields of this type, under
    /// a single object header.
    pub fn extends<B: Introspect>(mut self, get: Accessor) -> Self {
        self.base = Some((TypeDesc::of::<B>(), get));
        self
    }

    pub fn field<F: Introspect>(mut self, name: &'static str, get: Accessor) -> Self {
        self.fields.push(Field {
            name,
            ty: TypeDesc::of::<F>(),
            get,
        });
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Every instance field across the base chain, each with the accessor
    /// path leading to it from the outermost value.
    pub fn instance_fields(&self) -> Vec<FieldPath> {
        let mut out = Vec::new();
        self.collect_fields(&[], &mut out);
        out
    }

    fn collect_fields(&self, prefix: &[Accessor], out: &mut Vec<FieldPath>) {
        if let Some((base, get)) = self.base {
            let mut path = prefix.to_vec();
            path.push(get);
            match base.layout() {
                Layout::Composite(inner) => inner.collect_fields(&path, out),
                _ => out.push(FieldPath {
                    name: base.name(),
                    ty: base,
                    path,
                }),
            }
        }

        for field in &self.fields {
            let mut path = prefix.to_vec();
            path.push(field.get);
            out.push(FieldPath {
                name: field.name,
                ty: field.ty,
                path,
            });
        }
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("base", &self.base.map(|(desc, _)| desc))
            .field(
                "fields",
                &self.fields.iter().map(|field| field.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// One declared field of a [`Composite`].
#[derive(Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: TypeDesc,
    pub get: Accessor,
}

/// A field reached from the outermost value through a chain of accessors.
#[derive(Clone)]
pub struct FieldPath {
    pub name: &'static str,
    pub ty: TypeDesc,
    pub path: Vec<Accessor>,
}

impl FieldPath {
    /// Follows the accessor chain. `None` if any step is absent.
    pub fn resolve<'a>(&self, value: &'a dyn Reflect) -> Option<&'a dyn Reflect> {
        self.path.iter().try_fold(value, |current, get| get(current))
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.name, self.ty)
    }
}

// == Derive Macro ==
/// Implements [`Introspect`] for a plain struct by listing its fields.
///
/// ```
/// use region_cache::reflect_struct;
///
/// struct Period {
///     start: i64,
///     end: i64,
///     label: String,
/// }
///
/// reflect_struct!(Period { start: i64, end: i64, label: String });
///
/// struct WeeklyPeriod {
///     period: Period,
///     week: u8,
/// }
///
/// // `period` is embedded: its fields are flattened under one header
/// reflect_struct!(WeeklyPeriod: period as Period { week: u8 });
/// ```
#[macro_export]
macro_rules! reflect_struct {
    ($ty:ident $(: $base:ident as $base_ty:ty)? { $($field:ident : $fty:ty),* $(,)? }) => {
        impl $crate::sizeof::Introspect for $ty {
            fn layout() -> $crate::sizeof::Layout {
                let composite = $crate::sizeof::Composite::new();
                $(
                    let composite = composite.extends::<$base_ty>({
                        fn get(
                            value: &dyn $crate::sizeof::Reflect,
                        ) -> ::std::option::Option<&dyn $crate::sizeof::Reflect> {
                            $crate::sizeof::downcast::<$ty>(value)
                                .map(|v| &v.$base as &dyn $crate::sizeof::Reflect)
                        }
                        get
                    });
                )?
                $(
                    let composite = composite.field::<$fty>(stringify!($field), {
                        fn get(
                            value: &dyn $crate::sizeof::Reflect,
                        ) -> ::std::option::Option<&dyn $crate::sizeof::Reflect> {
                            $crate::sizeof::downcast::<$ty>(value)
                                .map(|v| &v.$field as &dyn $crate::sizeof::Reflect)
                        }
                        get
                    });
                )*
                $crate::sizeof::Layout::Composite(composite)
            }
        }
    };
}

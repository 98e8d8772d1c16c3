//! Entity model shared by the graph, the match table and the classifiers.
//!
//! Entities live in arenas owned by [`crate::graph::ClassGraph`] and refer to
//! each other through the copyable ids defined here, so cyclic relations
//! (class ↔ match ↔ class, method ↔ hierarchy group ↔ method, array ↔ element)
//! are plain lookups.

mod entity;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use self::entity::{
    ClassEntity, FieldEntity, Initializer, InsnTarget, MethodEntity, MethodKind, VarEntity,
};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Arena index of a class (including array and placeholder classes).
    ClassId,
    "class"
);
define_id!(MethodId, "method");
define_id!(FieldId, "field");
define_id!(
    /// Arena index of a method argument or local variable.
    VarId,
    "var"
);
define_id!(
    /// Index of a method hierarchy group.
    GroupId,
    "group"
);

/// Any entity id, for operations that treat every kind alike.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EntityRef {
    Class(ClassId),
    Method(MethodId),
    Field(FieldId),
    Var(VarId),
}

impl From<ClassId> for EntityRef {
    fn from(id: ClassId) -> Self {
        EntityRef::Class(id)
    }
}

impl From<MethodId> for EntityRef {
    fn from(id: MethodId) -> Self {
        EntityRef::Method(id)
    }
}

impl From<FieldId> for EntityRef {
    fn from(id: FieldId) -> Self {
        EntityRef::Field(id)
    }
}

impl From<VarId> for EntityRef {
    fn from(id: VarId) -> Self {
        EntityRef::Var(id)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
    /// Library classes identical on both sides; never a match subject.
    Shared,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
            Side::Shared => Side::Shared,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
            Side::Shared => "shared",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
            Side::Shared => 2,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Class,
    Method,
    Field,
    Arg,
    Var,
}

/// A numeric literal; floating point values are kept as raw bits so they can live in sets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Number {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
}

impl Number {
    pub fn float(v: f32) -> Self {
        Number::Float(v.to_bits())
    }

    pub fn double(v: f64) -> Self {
        Number::Double(v.to_bits())
    }
}

/// Which name variant to show for an entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameType {
    Plain,
    Mapped,
    Tmp,
    Uid,
    Aux(u8),
    /// Mapped name, else temporary name, else plain name.
    MappedTmpPlain,
}

/// Mutable name variants attached to every entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Names {
    pub(crate) tmp: Option<String>,
    pub(crate) mapped: Option<String>,
    pub(crate) aux: Vec<Option<String>>,
    pub(crate) uid: Option<u32>,
    pub(crate) comment: Option<String>,
}

impl Names {
    pub fn tmp(&self) -> Option<&str> {
        self.tmp.as_deref()
    }

    pub fn mapped(&self) -> Option<&str> {
        self.mapped.as_deref()
    }

    pub fn aux(&self, index: usize) -> Option<&str> {
        self.aux.get(index).and_then(|n| n.as_deref())
    }

    pub fn uid(&self) -> Option<u32> {
        self.uid
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub(crate) fn set_aux(&mut self, index: usize, name: Option<String>) {
        if self.aux.len() <= index {
            self.aux.resize(index + 1, None);
        }
        self.aux[index] = name;
    }

    /// Resolves a name variant; `plain` is the entity's original name.
    pub fn resolve(&self, plain: &str, uid_prefix: &str, ty: NameType) -> Option<String> {
        match ty {
            NameType::Plain => Some(plain.to_string()),
            NameType::Mapped => self.mapped.clone(),
            NameType::Tmp => self.tmp.clone(),
            NameType::Uid => self.uid.map(|uid| format!("{uid_prefix}_{uid}")),
            NameType::Aux(idx) => self.aux(idx as usize).map(str::to_string),
            NameType::MappedTmpPlain => Some(
                self.mapped
                    .clone()
                    .or_else(|| self.tmp.clone())
                    .unwrap_or_else(|| plain.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_resolution_falls_back_in_order() {
        let mut names = Names::default();
        assert_eq!(
            names.resolve("a", "class", NameType::MappedTmpPlain).as_deref(),
            Some("a")
        );
        names.tmp = Some("class_1".into());
        assert_eq!(
            names.resolve("a", "class", NameType::MappedTmpPlain).as_deref(),
            Some("class_1")
        );
        names.mapped = Some("Foo".into());
        assert_eq!(
            names.resolve("a", "class", NameType::MappedTmpPlain).as_deref(),
            Some("Foo")
        );
        assert_eq!(names.resolve("a", "class", NameType::Uid), None);
        names.uid = Some(7);
        assert_eq!(names.resolve("a", "class", NameType::Uid).as_deref(), Some("class_7"));
    }

    #[test]
    fn aux_slots_grow_on_demand() {
        let mut names = Names::default();
        names.set_aux(2, Some("x".into()));
        assert_eq!(names.aux(0), None);
        assert_eq!(names.aux(2), Some("x"));
        assert_eq!(names.resolve("p", "m", NameType::Aux(2)).as_deref(), Some("x"));
    }

    #[test]
    fn sides_are_opposite() {
        assert_eq!(Side::A.opposite(), Side::B);
        assert_eq!(Side::Shared.opposite(), Side::Shared);
    }
}

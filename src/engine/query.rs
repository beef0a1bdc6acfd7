//! Typed component sets used to filter entity rows.
//!
//! A query in this runtime is always "every listed component present,
//! conjunctively". [`ComponentSet`] turns a tuple of component types into
//! the [`ComponentKey`]s it names; [`required_signature`] resolves those keys
//! against a registry into the [`Signature`] that row filtering compares with.
//!
//! ## Example
//! ```ignore
//! storage.for_entities_with::<(Position, Velocity), _>(|entity| {
//!     let velocity = storage.get_component::<Velocity>(entity);
//!     // ...
//! });
//! ```
//!
//! The empty tuple `()` is a valid set. It matches no particular row and
//! makes storage fire the callable exactly once with
//! [`Entity::SENTINEL`](crate::engine::entity::Entity::SENTINEL).

use crate::engine::component::{Component, ComponentKey, ComponentRegistry};
use crate::engine::types::Signature;


/// A compile-time list of component types.
pub trait ComponentSet {
    /// Keys of every component in the set, in declaration order.
    fn keys() -> Vec<ComponentKey>;
}

macro_rules! impl_component_set {
    ($($name:ident),*) => {
        impl<$($name: Component),*> ComponentSet for ($($name,)*) {
            fn keys() -> Vec<ComponentKey> {
                vec![$(ComponentKey::of::<$name>()),*]
            }
        }
    };
}

impl_component_set!();
impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

/// Resolves `keys` into the signature a row must contain.
///
/// Returns `None` if any key is unregistered: no row can own such a
/// component, so the set matches nothing.
pub fn required_signature(registry: &ComponentRegistry, keys: &[ComponentKey]) -> Option<Signature> {
    let mut signature = Signature::default();
    for key in keys {
        signature.set(registry.component_id_of_type_id(key.type_id())?);
    }
    Some(signature)
}

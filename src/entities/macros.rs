//! Macros for reducing boilerplate when defining entities
//!
//! An entity type is a unit marker struct implementing
//! [`Entity`](crate::core::entity::Entity). The macro below generates the
//! struct, the trait implementation and a `repository` shortcut.

/// Complete macro to define an entity type with its attributes
///
/// Each attribute is written as an [`Attribute`](crate::core::entity::Attribute)
/// constructor call, optionally followed by builder calls.
///
/// # Example
/// ```rust,ignore
/// impl_entity!(Pokemon, "Pokemon", [
///     integer("id"),
///     string("name").required(),
///     integer("level"),
///     to_one("type", "Type").inverse("pokemons"),
/// ]);
///
/// impl_entity!(Type, "Type", [
///     integer("id"),
///     string("name"),
///     to_many("pokemons", "Pokemon").inverse("type"),
/// ]);
///
/// store.define::<Pokemon>()?;
/// let charizard = Pokemon::repository(&store).create_new_entity()?;
/// ```
#[macro_export]
macro_rules! impl_entity {
    (
        $type:ident,
        $type_name:expr,
        [
            $(
                $kind:ident ( $( $arg:expr ),* $(,)? )
                $( . $modifier:ident ( $( $modifier_arg:expr ),* ) )*
            ),* $(,)?
        ]
    ) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $type;

        impl $crate::core::entity::Entity for $type {
            fn entity_name() -> &'static str {
                $type_name
            }

            fn description() -> $crate::core::entity::EntityDescription {
                $crate::core::entity::EntityDescription::new($type_name)
                    $(
                        .with(
                            $crate::core::entity::Attribute::$kind( $( $arg ),* )
                                $( .$modifier( $( $modifier_arg ),* ) )*
                        )
                    )*
            }
        }

        impl $type {
            /// Repository for this entity type over `store`
            #[allow(dead_code)]
            pub fn repository(
                store: &dyn $crate::core::store::EntityStore,
            ) -> $crate::core::repository::Repository<'_, $type> {
                $crate::core::repository::Repository::new(store)
            }
        }
    };
}

//! Macro-generated test suite for `Repository` over any `EntityStore`.
//!
//! The `repository_contract_tests!` macro generates a test module that
//! validates find, create, update and delete behavior, relationship
//! consistency and completion delivery for a store implementation.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod store_harness;
//!
//! use store_harness::*;
//!
//! repository_contract_tests!(pokedex_store(StoreSettings::default()));
//! ```
//!
//! # Generated Tests
//!
//! ## Creation & lookup
//! - `test_create_new_entity` — created entities show up in fetches and inverse collections
//! - `test_find_all_matches_null_predicate` — no predicate means every entity
//! - `test_find_all_sort_directions` — descending and ascending are reversed
//! - `test_find_all_with_attribute` — plain, reference and dotted-path equality
//! - `test_find_all_with_predicate` — typed and format-string predicates
//! - `test_find_first_or_create_with_attribute` — idempotent, creates when missing
//! - `test_find_first_or_create_with_predicate` — no duplicate, no auto-populate
//! - `test_find_first_or_create_concurrently` and
//!   `test_find_first_or_create_with_predicate_concurrently` — one entity across threads
//! - `test_count`
//!
//! ## Deletion & update
//! - `test_delete_all` — empties the type and the inverse collection
//! - `test_delete_all_matching` — removes exactly the matches
//! - `test_bulk_update_and_delete_do_not_interleave` — concurrent bulk changes stay whole
//! - `test_update_all` — counts per predicate, including reference predicates
//! - `test_update_all_is_all_or_nothing` — unknown attribute commits nothing
//!
//! ## Completion & persistence
//! - `test_completion_fires_once_after_return`
//! - `test_save_requires_mandatory_attributes`

/// Generate a full `Repository` conformance test suite.
///
/// `$factory` must evaluate to a value implementing `EntityStore` with the
/// Pokedex model defined. It is re-evaluated for each test to ensure
/// isolation.
#[macro_export]
macro_rules! repository_contract_tests {
    ($factory:expr) => {
        mod repository_contract_tests {
            use super::*;
            use record::prelude::*;
            use std::sync::Arc;
            use std::sync::atomic::{AtomicUsize, Ordering};
            use std::time::Duration;

            // ==================================================================
            // Creation & lookup
            // ==================================================================

            #[test]
            fn test_create_new_entity() {
                let store = $factory;
                let pokemons = Pokemon::repository(&store);
                let fire = create_type(&store, kind::FIRE, "Fire");

                create_pokemon(&store, dex::CHARIZARD, "Charizard", 36, &fire);
                let all = pokemons.find_all(&SortSpec::new()).unwrap();
                assert_eq!(all.len(), 1, "Should contain 1 pokemon");

                create_pokemon(&store, dex::CHARMANDER, "Charmander", 1, &fire);
                let all = pokemons.find_all(&SortSpec::new()).unwrap();
                assert_eq!(all.len(), 2, "Should contain 2 pokemons");
                assert_eq!(fire.collection("pokemons").len(), 2);

                pokemons.delete_all().unwrap();
                assert!(pokemons.find_all(&SortSpec::new()).unwrap().is_empty());
                assert!(fire.collection("pokemons").is_empty());
            }

            #[test]
            fn test_create_new_entity_is_uninitialized() {
                let store = $factory;
                let pokemon = Pokemon::repository(&store).create_new_entity().unwrap();
                assert_eq!(pokemon.get("name"), Some(FieldValue::Null));
                assert_eq!(pokemon.get("level"), Some(FieldValue::Null));
                assert!(pokemon.related("type").is_none());
                assert!(!pokemon.is_deleted());
            }

            #[test]
            fn test_find_all_matches_null_predicate() {
                let store = $factory;
                let dex = Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let all = pokemons.find_all(&SortSpec::new()).unwrap();
                let unfiltered = pokemons
                    .find_all_with_predicate(None, &SortSpec::new())
                    .unwrap()
                    .into_value();
                assert_eq!(all, unfiltered);
                assert_eq!(all.len(), 4);
                for pokemon in [&dex.charmander, &dex.charmeleon, &dex.charizard, &dex.blastoise] {
                    assert!(all.contains(pokemon));
                }
            }

            #[test]
            fn test_find_all_sort_directions() {
                let store = $factory;
                let (_, line) = Pokedex::seed_fire_line(&store);
                let pokemons = Pokemon::repository(&store);

                let descending = pokemons.find_all(&SortSpec::descending("level")).unwrap();
                assert_eq!(levels(&descending), vec![36, 16, 1]);

                let mut ascending = pokemons.find_all(&SortSpec::ascending("level")).unwrap();
                assert_eq!(ascending, line);
                ascending.reverse();
                assert_eq!(ascending, descending, "Order mismatch");
            }

            #[test]
            fn test_find_all_sort_is_stable_on_ties() {
                let store = $factory;
                let dex = Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                // charizard and blastoise share level 36: store order breaks the tie
                let sorted = pokemons.find_all(&SortSpec::descending("level")).unwrap();
                assert_eq!(sorted[0], dex.charizard);
                assert_eq!(sorted[1], dex.blastoise);

                let by_type_then_level = SortSpec::descending("type.name").then_by("level", true);
                let sorted = pokemons.find_all(&by_type_then_level).unwrap();
                assert_eq!(names(&sorted), vec!["Blastoise", "Charmander", "Charmeleon", "Charizard"]);
            }

            #[test]
            fn test_find_all_with_attribute() {
                let store = $factory;
                let dex = Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let found = pokemons
                    .find_all_with_attribute("name", "Charizard", &SortSpec::new())
                    .unwrap();
                assert_eq!(found, vec![dex.charizard.clone()]);

                let by_reference = pokemons
                    .find_all_with_attribute("type", &dex.fire, &SortSpec::new())
                    .unwrap();
                assert_eq!(by_reference.len(), 3);

                let by_path = pokemons
                    .find_all_with_attribute("type.name", "Fire", &SortSpec::descending("level"))
                    .unwrap();
                assert_eq!(by_path, vec![dex.charizard.clone(), dex.charmeleon.clone(), dex.charmander.clone()]);

                let mut ascending = pokemons
                    .find_all_with_attribute("type.name", "Fire", &SortSpec::ascending("level"))
                    .unwrap();
                ascending.reverse();
                assert_eq!(ascending, by_path, "Order mismatch");

                let nothing = pokemons
                    .find_all_with_attribute("name", "Pikachu", &SortSpec::new())
                    .unwrap();
                assert!(nothing.is_empty());
            }

            #[test]
            fn test_find_all_with_predicate() {
                let store = $factory;
                let (_, line) = Pokedex::seed_fire_line(&store);
                let pokemons = Pokemon::repository(&store);

                let exact = Predicate::format("level == %d", &[36.into()]).unwrap();
                let found = pokemons.find_all_with_predicate(Some(&exact), &SortSpec::new()).unwrap();
                assert_eq!(found.len(), 1);

                let below = Predicate::lt("level", 36);
                let descending = pokemons
                    .find_all_with_predicate(Some(&below), &SortSpec::descending("level"))
                    .unwrap()
                    .into_value();
                assert_eq!(descending, vec![line[1].clone(), line[0].clone()]);

                let mut ascending = pokemons
                    .find_all_with_predicate(Some(&below), &SortSpec::ascending("level"))
                    .unwrap()
                    .into_value();
                ascending.reverse();
                assert_eq!(ascending, descending, "Order mismatch");
            }

            #[test]
            fn test_find_all_with_unknown_field_is_empty() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let predicate = Predicate::ne("nickname", "Sparky");
                let found = pokemons.find_all_with_predicate(Some(&predicate), &SortSpec::new()).unwrap();
                assert!(found.is_empty());
            }

            #[test]
            fn test_find_first_or_create_with_attribute() {
                let store = $factory;
                let fire = create_type(&store, kind::FIRE, "Fire");
                let charizard = create_pokemon(&store, dex::CHARIZARD, "Charizard", 36, &fire);
                let pokemons = Pokemon::repository(&store);

                let again = pokemons
                    .find_first_or_create_with_attribute("name", "Charizard")
                    .unwrap()
                    .into_value();
                assert_eq!(again, charizard, "Pokemon should be equal");
                let again = pokemons
                    .find_first_or_create_with_attribute("name", "Charizard")
                    .unwrap()
                    .into_value();
                assert_eq!(again, charizard);
                assert_eq!(pokemons.count(None).unwrap(), 1);

                let charmander = pokemons
                    .find_first_or_create_with_attribute("name", "Charmander")
                    .unwrap()
                    .into_value();
                assert_ne!(charmander, charizard, "Pokemon should mismatch");
                assert_eq!(charmander.get("name"), Some(FieldValue::from("Charmander")));
                assert_eq!(pokemons.count(None).unwrap(), 2);
            }

            #[test]
            fn test_find_first_or_create_with_predicate() {
                let store = $factory;
                let fire = create_type(&store, kind::FIRE, "Fire");
                let charizard = create_pokemon(&store, dex::CHARIZARD, "Charizard", 36, &fire);
                let pokemons = Pokemon::repository(&store);

                let predicate = Predicate::and([
                    Predicate::eq("name", "Charizard"),
                    Predicate::eq("level", 36),
                    Predicate::eq("type", &fire),
                ]);
                let again = pokemons
                    .find_first_or_create_with_predicate(&predicate)
                    .unwrap()
                    .into_value();
                assert_eq!(again, charizard);
                assert_eq!(pokemons.count(None).unwrap(), 1);
                assert_eq!(Type::repository(&store).count(None).unwrap(), 1);

                let missing = Predicate::eq("name", "Charmander");
                let created = pokemons
                    .find_first_or_create_with_predicate(&missing)
                    .unwrap()
                    .into_value();
                assert_ne!(created, charizard);
                assert_eq!(created.get("name"), Some(FieldValue::Null));
                assert_eq!(pokemons.count(None).unwrap(), 2);
            }

            #[test]
            fn test_find_first_or_create_concurrently() {
                let store = Arc::new($factory);
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let store = Arc::clone(&store);
                        std::thread::spawn(move || {
                            Pokemon::repository(&*store)
                                .find_first_or_create_with_attribute("name", "Mew")
                                .unwrap()
                                .value
                                .id()
                        })
                    })
                    .collect();
                let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

                assert!(ids.windows(2).all(|w| w[0] == w[1]));
                assert_eq!(Pokemon::repository(&*store).count(None).unwrap(), 1);
            }

            #[test]
            fn test_find_first_or_create_with_predicate_concurrently() {
                let store = Arc::new($factory);
                // a fresh entity has no level, so it satisfies this predicate
                // and later callers must find it instead of creating another
                let unleveled = Predicate::not(Predicate::gt("level", 0));
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let store = Arc::clone(&store);
                        let predicate = unleveled.clone();
                        std::thread::spawn(move || {
                            Pokemon::repository(&*store)
                                .find_first_or_create_with_predicate(&predicate)
                                .unwrap()
                                .value
                                .id()
                        })
                    })
                    .collect();
                let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

                assert!(ids.windows(2).all(|w| w[0] == w[1]));
                assert_eq!(Pokemon::repository(&*store).count(None).unwrap(), 1);
            }

            #[test]
            fn test_bulk_update_and_delete_do_not_interleave() {
                for _ in 0..50 {
                    let store = Arc::new($factory);
                    let pokemons = Pokemon::repository(&*store);
                    for level in 0..100 {
                        let pokemon = pokemons.create_new_entity().unwrap();
                        pokemon.set("name", format!("Unown {}", level)).unwrap();
                        pokemon.set("level", level).unwrap();
                    }

                    let deleter = {
                        let store = Arc::clone(&store);
                        std::thread::spawn(move || {
                            Pokemon::repository(&*store)
                                .delete_all_matching(&Predicate::ge("level", 0))
                                .unwrap()
                        })
                    };
                    let updater = {
                        let store = Arc::clone(&store);
                        std::thread::spawn(move || {
                            Pokemon::repository(&*store)
                                .update_all([("level", 50)], Some(&Predicate::gt("level", 5)), UpdateResultMode::Count)
                                .map(|outcome| outcome.count())
                        })
                    };

                    // either order is fine, but each step sees the other completely
                    assert_eq!(deleter.join().unwrap(), 100);
                    let updated = updater.join().unwrap().unwrap();
                    assert!(updated == 0 || updated == 94, "updated {}", updated);
                    assert_eq!(pokemons.count(None).unwrap(), 0);
                }
            }

            #[test]
            fn test_count() {
                let store = $factory;
                let dex = Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                assert_eq!(Type::repository(&store).count(None).unwrap(), 2);
                assert_eq!(pokemons.count(None).unwrap(), 4);
                let above_six = Predicate::format("level > 6", &[]).unwrap();
                assert_eq!(pokemons.count(Some(&above_six)).unwrap(), 3);
                let above_max = Predicate::format("level > 36", &[]).unwrap();
                assert_eq!(pokemons.count(Some(&above_max)).unwrap(), 0);
                assert_eq!(pokemons.count(Some(&Predicate::eq("type", &dex.fire))).unwrap(), 3);
            }

            // ==================================================================
            // Deletion & update
            // ==================================================================

            #[test]
            fn test_delete_all() {
                let store = $factory;
                let (fire, _) = Pokedex::seed_fire_line(&store);
                let pokemons = Pokemon::repository(&store);

                assert_eq!(pokemons.count(None).unwrap(), 3);
                assert_eq!(pokemons.delete_all().unwrap(), 3);
                assert_eq!(pokemons.count(None).unwrap(), 0);
                assert!(fire.collection("pokemons").is_empty());
                assert!(!fire.is_deleted());
            }

            #[test]
            fn test_delete_all_matching() {
                let store = $factory;
                let (fire, line) = Pokedex::seed_fire_line(&store);
                let pokemons = Pokemon::repository(&store);

                let predicate = Predicate::format("level == %d", &[36.into()]).unwrap();
                assert_eq!(pokemons.delete_all_matching(&predicate).unwrap(), 1);

                let left = pokemons.find_all(&SortSpec::ascending("level")).unwrap();
                assert_eq!(levels(&left), vec![1, 16]);
                assert!(line[2].is_deleted());
                assert_eq!(fire.collection("pokemons"), vec![line[0].clone(), line[1].clone()]);
            }

            #[test]
            fn test_delete_type_nullifies_pokemons() {
                let store = $factory;
                let dex = Pokedex::seed(&store);

                assert_eq!(Type::repository(&store).delete_all_matching(&Predicate::eq("name", "Water")).unwrap(), 1);
                assert!(dex.blastoise.related("type").is_none());
                assert_eq!(dex.charizard.related("type"), Some(dex.fire.clone()));
            }

            #[test]
            fn test_update_all() {
                let store = $factory;
                let fire = create_type(&store, kind::FIRE, "Fire");
                let water = create_type(&store, kind::WATER, "Water");
                create_pokemon(&store, dex::CHARMANDER, "Charmander", 1, &fire);
                create_pokemon(&store, dex::CHARMELEON, "Charmeleon", 16, &fire);
                create_pokemon(&store, dex::CHARIZARD, "Charizard", 36, &fire);
                let pokemons = Pokemon::repository(&store);

                let above_five = Predicate::build("level", Some(5.into()), ">").unwrap().unwrap();
                let updated = pokemons
                    .update_all([("level", 100)], Some(&above_five), UpdateResultMode::Count)
                    .unwrap();
                assert_eq!(updated, UpdateOutcome::Count(2));
                let sorted = pokemons.find_all(&SortSpec::ascending("level")).unwrap();
                assert_eq!(levels(&sorted), vec![1, 100, 100]);

                let wrong_type = Predicate::eq("type", &water);
                let updated = pokemons
                    .update_all([("level", 1)], Some(&wrong_type), UpdateResultMode::Count)
                    .unwrap();
                assert_eq!(updated.count(), 0);

                let fire_type = Predicate::eq("type", &fire);
                let updated = pokemons
                    .update_all([("level", 100)], Some(&fire_type), UpdateResultMode::Objects)
                    .unwrap();
                assert_eq!(updated.count(), 3);
                let UpdateOutcome::Objects(objects) = updated else {
                    panic!("expected updated objects");
                };
                assert_eq!(levels(&objects), vec![100, 100, 100]);
            }

            #[test]
            fn test_update_all_relationship() {
                let store = $factory;
                let dex = Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let updated = pokemons
                    .update_all([("type", &dex.water)], Some(&Predicate::eq("name", "Charizard")), UpdateResultMode::Ids)
                    .unwrap();
                assert_eq!(updated, UpdateOutcome::Ids(vec![dex.charizard.id()]));
                assert_eq!(dex.fire.collection("pokemons").len(), 2);
                assert_eq!(dex.water.collection("pokemons"), vec![dex.blastoise.clone(), dex.charizard.clone()]);
            }

            #[test]
            fn test_update_all_is_all_or_nothing() {
                let store = $factory;
                let (_, line) = Pokedex::seed_fire_line(&store);
                let pokemons = Pokemon::repository(&store);

                let err = pokemons
                    .update_all(
                        [("level", FieldValue::Integer(100)), ("shiny", FieldValue::Boolean(true))],
                        None,
                        UpdateResultMode::Count,
                    )
                    .unwrap_err();
                assert!(matches!(err, RecordError::Update(UpdateError::UnknownAttribute { .. })));
                assert_eq!(levels(&line), vec![1, 16, 36]);

                let err = pokemons
                    .update_all([("type", &line[0])], None, UpdateResultMode::Count)
                    .unwrap_err();
                assert!(matches!(err, RecordError::Update(UpdateError::Store(StoreError::WrongEntity { .. }))));
                assert_eq!(line[0].related("type").map(|t| t.get("name")), Some(Some(FieldValue::from("Fire"))));
            }

            // ==================================================================
            // Completion & persistence
            // ==================================================================

            #[tokio::test]
            async fn test_completion_fires_once_after_return() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let fetched = pokemons
                    .find_all_with_predicate(Some(&Predicate::ge("level", 16)), &SortSpec::new())
                    .unwrap();
                // the value is usable before the signal is observed
                assert_eq!(fetched.len(), 3);

                let hits = Arc::new(AtomicUsize::new(0));
                let (tx, rx) = tokio::sync::oneshot::channel();
                let counter = Arc::clone(&hits);
                fetched.completion.on_complete(move |outcome| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(outcome.is_ok());
                });

                let ok = tokio::time::timeout(Duration::from_secs(10), rx).await.unwrap().unwrap();
                assert!(ok);
                tokio::task::yield_now().await;
                assert_eq!(hits.load(Ordering::SeqCst), 1);
            }

            #[tokio::test]
            async fn test_completion_follows_save() {
                let store = $factory;
                let pokemons = Pokemon::repository(&store);
                let mew = pokemons
                    .find_first_or_create_with_attribute("name", "Mew")
                    .unwrap();
                pokemons.save().unwrap();

                let timeout = store.settings().completion_timeout();
                let mew = mew.value;
                let fetched = pokemons
                    .find_all_with_attribute("name", "Mew", &SortSpec::new())
                    .unwrap();
                assert_eq!(fetched, vec![mew]);
                let found = pokemons
                    .find_all_with_predicate(None, &SortSpec::new())
                    .unwrap();
                found.completion.wait(timeout).await.unwrap();
            }

            #[test]
            fn test_save_requires_mandatory_attributes() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);
                pokemons.save().unwrap();

                let unnamed = pokemons.create_new_entity().unwrap();
                let err = pokemons.save().unwrap_err();
                assert_eq!(err.error_code(), "MISSING_REQUIRED_ATTRIBUTE");
                assert!(matches!(
                    err,
                    RecordError::Persistence(PersistenceError::MissingRequired { id, .. }) if id == unnamed.id()
                ));

                unnamed.set("name", "Missingno").unwrap();
                pokemons.save().unwrap();
            }
        }
    };
}

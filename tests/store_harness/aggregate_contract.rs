//! Macro-generated test suite for aggregation over any `EntityStore`.
//!
//! Every test seeds the Pokedex fixture (Charmander 1, Charmeleon 16 and
//! Charizard 36 of type Fire, Blastoise 36 of type Water) and checks sum,
//! min, max and average, ungrouped and grouped.
//!
//! # Usage
//!
//! ```rust,ignore
//! aggregate_contract_tests!(pokedex_store(StoreSettings::default()));
//! ```

/// Generate the aggregation conformance test suite.
///
/// `$factory` must evaluate to a value implementing `EntityStore` with the
/// Pokedex model defined.
#[macro_export]
macro_rules! aggregate_contract_tests {
    ($factory:expr) => {
        mod aggregate_contract_tests {
            use super::*;
            use record::prelude::*;

            const TYPE_GROUP: &[&str] = &["type.name", "type.id"];

            fn fire_key() -> FieldValue {
                FieldValue::from("Fire")
            }

            fn water_key() -> FieldValue {
                FieldValue::from("Water")
            }

            // ==================================================================
            // Sum
            // ==================================================================

            #[tokio::test]
            async fn test_sum() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let sum = pokemons.sum("level", None).unwrap();
                assert_close(*sum, 89.0);
                sum.completion.await.unwrap();

                let sums = pokemons.sum_fields(&["level", "id"], None).unwrap().settle().await.unwrap();
                assert_eq!(sums, vec![Some(89.0), Some(24.0)]);
            }

            #[test]
            fn test_sum_matches_fold() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let all = pokemons.find_all(&SortSpec::new()).unwrap();
                let folded: i64 = levels(&all).iter().sum();
                assert_close(*pokemons.sum("level", None).unwrap(), folded as f64);

                let max = levels(&all).into_iter().max().unwrap_or_default();
                assert_close_opt(*pokemons.max("level", None).unwrap(), max as f64);
            }

            #[test]
            fn test_sum_group_by() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let rows = pokemons.sum_grouped(&["level"], None, TYPE_GROUP).unwrap().into_value();
                assert_eq!(rows.len(), 2);
                assert_close_opt(row_for(&rows, "type.name", &fire_key()).value("level"), 53.0);
                assert_close_opt(row_for(&rows, "type.name", &water_key()).value("level"), 36.0);

                let fire = row_for(&rows, "type.name", &fire_key());
                assert_eq!(fire.key_value("type.id"), Some(&FieldValue::Integer(kind::FIRE)));
                assert_eq!(fire.count, 3);
            }

            #[test]
            fn test_group_sums_add_up() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let partitions: [&[&str]; 3] = [&["type"], &["type.name", "type.id"], &["level"]];
                for predicate in [None, Some(Predicate::gt("level", 1))] {
                    let total = *pokemons.sum("level", predicate.as_ref()).unwrap();
                    for group_by in partitions {
                        let rows = pokemons
                            .sum_grouped(&["level"], predicate.as_ref(), group_by)
                            .unwrap()
                            .into_value();
                        let grouped: f64 = rows.iter().filter_map(|r| r.value("level")).sum();
                        assert_close(grouped, total);
                    }
                }
            }

            #[test]
            fn test_groups_ordered_by_first_appearance() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let rows = pokemons.sum_grouped(&["level"], None, &["level"]).unwrap().into_value();
                let keys: Vec<_> = rows.iter().map(|r| r.key_value("level").cloned()).collect();
                assert_eq!(
                    keys,
                    vec![
                        Some(FieldValue::Integer(1)),
                        Some(FieldValue::Integer(16)),
                        Some(FieldValue::Integer(36)),
                    ]
                );
                assert_eq!(rows[2].count, 2);
            }

            // ==================================================================
            // Max & Min
            // ==================================================================

            #[test]
            fn test_max() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let max = pokemons.max_fields(&["level"], None).unwrap().into_value();
                assert_eq!(max, vec![Some(36.0)]);
                assert_close_opt(*pokemons.max("level", None).unwrap(), 36.0);

                let low = Predicate::lt("level", 5);
                assert_close_opt(*pokemons.max("level", Some(&low)).unwrap(), 1.0);
            }

            #[test]
            fn test_max_group_by() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let rows = pokemons.max_grouped(&["level"], None, TYPE_GROUP).unwrap().into_value();
                assert_close_opt(row_for(&rows, "type.name", &fire_key()).value("level"), 36.0);
                assert_close_opt(row_for(&rows, "type.name", &water_key()).value("level"), 36.0);
            }

            #[test]
            fn test_min() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                assert_close_opt(*pokemons.min("level", None).unwrap(), 1.0);
                let evolved = Predicate::ge("level", 6);
                assert_close_opt(*pokemons.min("level", Some(&evolved)).unwrap(), 16.0);
                assert_eq!(pokemons.min_fields(&["level", "id"], None).unwrap().value, vec![Some(1.0), Some(4.0)]);
            }

            #[test]
            fn test_min_group_by() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let rows = pokemons.min_grouped(&["level"], None, TYPE_GROUP).unwrap().into_value();
                assert_close_opt(row_for(&rows, "type.name", &fire_key()).value("level"), 1.0);
                assert_close_opt(row_for(&rows, "type.name", &water_key()).value("level"), 36.0);
            }

            // ==================================================================
            // Average
            // ==================================================================

            #[test]
            fn test_avg() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                assert_close_opt(*pokemons.avg("level", None).unwrap(), 22.25);
                let evolved = Predicate::ge("level", 6);
                assert_close_opt(*pokemons.avg("level", Some(&evolved)).unwrap(), 88.0 / 3.0);
                let avgs = pokemons.avg_fields(&["level", "id"], None).unwrap().into_value();
                assert_close_opt(avgs[1], 6.0);
            }

            #[test]
            fn test_avg_group_by() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let rows = pokemons.avg_grouped(&["level"], None, TYPE_GROUP).unwrap().into_value();
                assert_close_opt(row_for(&rows, "type.name", &fire_key()).value("level"), 53.0 / 3.0);
                assert_close_opt(row_for(&rows, "type.name", &water_key()).value("level"), 36.0);
            }

            // ==================================================================
            // Edge cases
            // ==================================================================

            #[test]
            fn test_empty_match() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);
                let nothing = Predicate::gt("level", 100);

                assert_eq!(*pokemons.sum("level", Some(&nothing)).unwrap(), 0.0);
                assert_eq!(*pokemons.min("level", Some(&nothing)).unwrap(), None);
                assert_eq!(*pokemons.max("level", Some(&nothing)).unwrap(), None);
                assert_eq!(*pokemons.avg("level", Some(&nothing)).unwrap(), None);
                assert!(pokemons.avg_grouped(&["level"], Some(&nothing), TYPE_GROUP).unwrap().is_empty());
            }

            #[test]
            fn test_null_values_are_skipped() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);
                let mew = pokemons.create_new_entity().unwrap();
                mew.set("name", "Mew").unwrap();

                assert_close_opt(*pokemons.avg("level", None).unwrap(), 22.25);
                let rows = pokemons.sum_grouped(&["level"], None, &["type"]).unwrap().into_value();
                // mew has no type: its group key is null and its sum is zero
                let untyped = row_for(&rows, "type", &FieldValue::Null);
                assert_eq!(untyped.count, 1);
                assert_eq!(untyped.value("level"), Some(0.0));
            }

            #[test]
            fn test_aggregate_request() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let request = AggregateRequest::new(AggregateFunction::Count)
                    .field("name")
                    .predicate(Some(&Predicate::eq("type.name", "Fire")));
                let result = pokemons.aggregate(&request).unwrap().into_value();
                assert_eq!(result, AggregateResult::Scalar(Some(3.0)));

                let request = AggregateRequest::new(AggregateFunction::Max)
                    .fields(["level", "id"])
                    .group_by(["type.name"]);
                let result = pokemons.aggregate(&request).unwrap().into_value();
                let water = row_for(result.rows(), "type.name", &water_key());
                assert_eq!(water.value("id"), Some(9.0));
                assert_eq!(water.values.keys().collect::<Vec<_>>(), vec!["level", "id"]);
            }

            #[test]
            fn test_aggregate_rejects_bad_fields() {
                let store = $factory;
                Pokedex::seed(&store);
                let pokemons = Pokemon::repository(&store);

                let err = pokemons.sum("weight", None).unwrap_err();
                assert!(matches!(err, RecordError::Query(QueryError::UnknownField { .. })));

                let err = pokemons.max("name", None).unwrap_err();
                assert_eq!(err.error_code(), "NON_NUMERIC_FIELD");

                let err = pokemons.sum_grouped(&["level"], None, &["type.color"]).unwrap_err();
                assert!(matches!(err, RecordError::Query(QueryError::UnknownField { .. })));
            }
        }
    };
}

//! Pokedex walkthrough: define a model, seed it, then query, update and
//! aggregate through typed repositories.
//!
//! Run with `RUST_LOG=record=debug cargo run --example pokedex` to see the
//! store's tracing output.

use record::prelude::*;

impl_entity!(Pokemon, "Pokemon", [
    integer("id"),
    string("name").required(),
    integer("level"),
    to_one("type", "Type").inverse("pokemons"),
]);

impl_entity!(Type, "Type", [
    integer("id"),
    string("name"),
    to_many("pokemons", "Pokemon").inverse("type"),
]);

const SETTINGS_YAML: &str = r#"
entities: []
settings:
  completion: deferred
  completion_timeout_ms: 2000
"#;

fn label(pokemon: &Managed<'_>) -> String {
    let name = pokemon
        .get("name")
        .and_then(|v| v.as_string().map(str::to_string))
        .unwrap_or_default();
    let level = pokemon.get("level").and_then(|v| v.as_integer()).unwrap_or_default();
    format!("{} (lv {})", name, level)
}

fn print_all(title: &str, pokemons: &[Managed<'_>]) {
    println!("{}:", title);
    for pokemon in pokemons {
        println!("   - {}", label(pokemon));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ModelConfig::from_yaml_str(SETTINGS_YAML)?;
    let store = InMemoryStore::new(config.settings);
    store.define::<Pokemon>()?;
    store.define::<Type>()?;
    let timeout = store.settings().completion_timeout();

    let types = Type::repository(&store);
    let pokemons = Pokemon::repository(&store);

    // Seed
    let fire = types.find_first_or_create_with_attribute("name", "Fire")?.into_value();
    fire.set("id", 10)?;
    let water = types.find_first_or_create_with_attribute("name", "Water")?.into_value();
    water.set("id", 11)?;

    for (id, name, level, kind) in [
        (4, "Charmander", 1, &fire),
        (5, "Charmeleon", 16, &fire),
        (6, "Charizard", 36, &fire),
        (9, "Blastoise", 36, &water),
    ] {
        let pokemon = pokemons.create_new_entity()?;
        pokemon.set("id", id)?;
        pokemon.set("name", name)?;
        pokemon.set("level", level)?;
        pokemon.set("type", kind)?;
    }
    pokemons.save()?;
    println!("Seeded {} pokemons of {} types\n", pokemons.count(None)?, types.count(None)?);

    // Find
    let by_level = pokemons.find_all(&SortSpec::descending("level").then_by("name", true))?;
    print_all("By level, highest first", &by_level);

    let evolved = Predicate::format("level >= %d AND type.name == %@", &[16.into(), "Fire".into()])?;
    let found = pokemons.find_all_with_predicate(Some(&evolved), &SortSpec::ascending("level"))?;
    print_all(&format!("Matching `{}`", evolved), &found);
    found.completion.wait(timeout).await?;

    let squirtle = pokemons
        .find_first_or_create_with_attribute("name", "Squirtle")?
        .settle()
        .await?;
    squirtle.set("id", 7)?;
    squirtle.set("level", 5)?;
    squirtle.set("type", &water)?;
    println!("\nWater line now has {} members", water.collection("pokemons").len());

    // Update
    let rare_candy = Predicate::lt("level", 10);
    let updated = pokemons.update_all([("level", 10)], Some(&rare_candy), UpdateResultMode::Objects)?;
    if let UpdateOutcome::Objects(raised) = &updated {
        print_all("\nRaised to level 10", raised);
    }

    // Aggregate
    let total = pokemons.sum("level", None)?.settle().await?;
    let average = pokemons.avg("level", None)?.settle().await?;
    println!("\nTotal level {}, average {:.2}", total, average.unwrap_or_default());

    let rows = pokemons
        .avg_grouped(&["level"], None, &["type.name"])?
        .settle()
        .await?;
    for row in &rows {
        let kind = row.key_value("type.name").cloned().unwrap_or(FieldValue::Null);
        println!(
            "   {} : {} pokemons, average level {:.2}",
            kind,
            row.count,
            row.value("level").unwrap_or_default()
        );
    }

    // Delete
    let deleted = pokemons.delete_all_matching(&Predicate::eq("type", &water))?;
    println!("\nReleased {} water pokemons, {} left", deleted, pokemons.count(None)?);
    pokemons.save()?;

    Ok(())
}

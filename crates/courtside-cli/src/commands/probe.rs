use anyhow::Result;

use crate::Args;

#[cfg(target_os = "windows")]
pub fn run(args: &Args) -> Result<()> {
    use courtside_core::TableKind;
    use owo_colors::OwoColorize;
    use strum::IntoEnumIterator;

    super::with_engine(args, false, |engine| {
        for table in TableKind::iter() {
            let chains = engine.schema().chains(table).len();
            match engine.resolve_table_base(table) {
                Some(address) => println!(
                    "{:<8} {}  ({} chain(s))",
                    table.to_string(),
                    format!("{address:#018x}").green(),
                    chains
                ),
                None => println!(
                    "{:<8} {}  ({} chain(s))",
                    table.to_string(),
                    "unresolved".red(),
                    chains
                ),
            }
        }
        Ok(())
    })
}

#[cfg(not(target_os = "windows"))]
pub fn run(_args: &Args) -> Result<()> {
    Err(super::unsupported())
}

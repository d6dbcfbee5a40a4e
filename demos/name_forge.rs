/// Name Forge example: builds fantasy names from syllable blocks.
///
/// Shows weighted blocks, repetition, capitalization, synchronizers shared
/// between blocks, and a private channel used as a side log.
///
/// Run with: cargo run --example name_forge

use pattern_engine::schema::build::{choice, func, seq, text, weighted};
use pattern_engine::schema::builtin::Builtin;
use pattern_engine::{Engine, Pattern};

fn f(builtin: Builtin, args: &[&str]) -> pattern_engine::schema::node::NodeRef {
    func(builtin, args.iter().map(|a| text(a)))
}

fn main() {
    let mut engine = Engine::builder()
        .size_limit(4_000)
        .timeout_ms(500)
        .build()
        .expect("Failed to build engine");

    // --- Syllables: one to three per name, common ones weighted up ---
    let syllable = weighted([
        (4.0, text("ka")),
        (3.0, text("ri")),
        (3.0, text("an")),
        (2.0, text("dor")),
        (1.0, text("vyn")),
        (1.0, text("thel")),
    ]);
    let name = seq([
        f(Builtin::Case, &["first"]),
        f(Builtin::Rep, &["2"]),
        syllable.clone(),
        func(Builtin::Chance, [text("50")]),
        syllable,
    ]);

    // --- Epithets: "the <adjective> <noun>", adjective and noun locked together ---
    let epithet = seq([
        text(" the "),
        f(Builtin::Sync, &["title", "locked"]),
        choice(&["Bold", "Grey", "Swift", "Unbroken"]),
        text(" "),
        f(Builtin::SyncUse, &["title"]),
        choice(&["Hand", "Wanderer", "Blade", "Oath"]),
    ]);

    let forge = Pattern::new(
        "name_forge",
        seq([
            name,
            epithet,
            func(
                Builtin::Chan,
                [text("log"), text("private"), text("forged one name")],
            ),
        ]),
    );

    println!("=== Name Forge ===\n");
    for seed in 0..8u64 {
        match engine.run(&forge, seed) {
            Ok(output) => {
                println!("  [{seed}] {}", output.main());
                if let Some(log) = output.get("log") {
                    println!("       (log: {log})");
                }
            }
            Err(e) => eprintln!("  [{seed}] error: {e}"),
        }
    }
}

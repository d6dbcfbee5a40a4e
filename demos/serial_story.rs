/// Serial Story example: streams a short tale one beat at a time.
///
/// Each `yield` ends a beat. Variables and the RNG carry over between beats,
/// so the hero chosen in the first beat is still the hero in the last.
///
/// Run with: cargo run --example serial_story

use pattern_engine::schema::build::{call, choice, define, func, seq, text};
use pattern_engine::schema::builtin::Builtin;
use pattern_engine::schema::node::NodeRef;
use pattern_engine::{Engine, Pattern};

fn f(builtin: Builtin, args: &[&str]) -> NodeRef {
    func(builtin, args.iter().map(|a| text(a)))
}

fn hero() -> NodeRef {
    f(Builtin::VarGet, &["hero"])
}

fn main() {
    let mut engine = Engine::builder()
        .timeout_ms(1_000)
        .build()
        .expect("Failed to build engine");

    let story = Pattern::new(
        "serial_story",
        seq([
            define(
                "beat",
                &["line"],
                seq([f(Builtin::Arg, &["line"]), func(Builtin::Yield, [])]),
            ),
            func(
                Builtin::VarSet,
                [text("hero"), choice(&["Mira", "Tobin", "Ysolde"])],
            ),
            call(
                "beat",
                [seq([
                    text("Once, "),
                    hero(),
                    text(" found "),
                    choice(&["a map", "an old key", "a sealed letter"]),
                    text("."),
                ])],
            ),
            call(
                "beat",
                [seq([
                    hero(),
                    text(" set out at "),
                    choice(&["dawn", "dusk", "midnight"]),
                    text("."),
                ])],
            ),
            call(
                "beat",
                [seq([
                    text("In the end, "),
                    hero(),
                    text(" "),
                    choice(&["came home", "stayed away", "was never seen again"]),
                    text("."),
                ])],
            ),
        ]),
    );

    println!("=== Serial Story ===\n");
    for (beat, output) in engine.run_serial(&story, 2026).enumerate() {
        match output {
            Ok(output) => println!("  {}. {}", beat + 1, output.main()),
            Err(e) => {
                eprintln!("  error: {e}");
                break;
            }
        }
    }
}

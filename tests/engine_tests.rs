/// Engine integration tests: full runs through the public API.

use pattern_engine::core::block::Reps;
use pattern_engine::core::output::ChannelVisibility;
use pattern_engine::core::vocab::{Entry, Table};
use pattern_engine::schema::build::{
    block, builtin, call, choice, define, esc, esc_times, func, query, seq, text,
};
use pattern_engine::schema::builtin::Builtin;
use pattern_engine::schema::node::{Carrier, NodeRef, Query};
use pattern_engine::{Engine, EngineConfig, EngineError, ErrorKind, Pattern, TableVocabulary};
use std::path::Path;
use std::time::{Duration, Instant};

fn pattern(root: NodeRef) -> Pattern {
    Pattern::new("test", root)
}

fn engine() -> Engine {
    Engine::builder().build().unwrap()
}

fn render(root: NodeRef, seed: u64) -> String {
    engine().run(&pattern(root), seed).unwrap().main().to_string()
}

fn f(builtin: Builtin, args: &[&str]) -> NodeRef {
    func(builtin, args.iter().map(|a| text(a)))
}

fn letters() -> NodeRef {
    choice(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"])
}

#[test]
fn same_seed_reproduces_output() {
    let root = seq([f(Builtin::Rep, &["40"]), letters()]);
    let first = render(root.clone(), 1234);
    assert_eq!(first.len(), 40);
    assert_eq!(first, render(root.clone(), 1234));
    assert_ne!(first, render(root, 1235));
}

#[test]
fn ping_and_pong_never_repeat_adjacent_items() {
    for kind in ["ping", "pong"] {
        let root = seq([
            f(Builtin::Rep, &["25"]),
            f(Builtin::Sync, &["p", kind]),
            choice(&["a", "b", "c", "d"]),
        ]);
        let out: Vec<char> = render(root, 6).chars().collect();
        assert_eq!(out.len(), 25);
        assert!(out.windows(2).all(|w| w[0] != w[1]), "{kind}: {out:?}");
    }
}

#[test]
fn cdeck_repeats_its_first_shuffle() {
    let root = seq([
        f(Builtin::Rep, &["15"]),
        f(Builtin::Sync, &["c", "cdeck"]),
        choice(&["a", "b", "c", "d", "e"]),
    ]);
    let out = render(root, 31);
    assert_eq!(&out[0..5], &out[5..10]);
    assert_eq!(&out[5..10], &out[10..15]);
    let mut first: Vec<char> = out[0..5].chars().collect();
    first.sort_unstable();
    assert_eq!(first, ['a', 'b', 'c', 'd', 'e']);
}

#[test]
fn pinned_sync_holds_its_position() {
    let root = seq([
        f(Builtin::SyncPin, &["f"]),
        f(Builtin::Rep, &["4"]),
        f(Builtin::Sync, &["f", "forward"]),
        choice(&["a", "b", "c"]),
        f(Builtin::SyncStep, &["f"]),
        f(Builtin::SyncUse, &["f"]),
        choice(&["a", "b", "c"]),
    ]);
    assert_eq!(render(root, 0), "aaaab");
}

#[test]
fn series_with_oxford_comma() {
    let root = seq([
        f(Builtin::Rep, &["each"]),
        f(Builtin::Sync, &["s", "forward"]),
        func(
            Builtin::SeriesOxford,
            [text(","), text(","), text("and")],
        ),
        choice(&["red", "green", "blue"]),
    ]);
    assert_eq!(render(root, 0), "red, green, and blue");
}

#[test]
fn builtins_resolve_by_name_and_arity() {
    let rep = builtin("r", vec![text("3")]).unwrap();
    let sep = builtin("s", vec![text("/")]).unwrap();
    assert_eq!(render(seq([rep, sep, choice(&["o"])]), 0), "o/o/o");
    assert!(builtin("r", vec![]).is_none());
    assert_eq!(
        Builtin::lookup("series", 3),
        Some(Builtin::SeriesOxford)
    );
    assert_eq!(Reps::Each.count(3), 3);
}

#[test]
fn channel_visibility_cascade() {
    let root = seq([
        text("main "),
        func(
            Builtin::Chan,
            [text("pub"), text("public"), text("shared ")],
        ),
        func(
            Builtin::Chan,
            [text("secret"), text("private"), text("hidden")],
        ),
        func(
            Builtin::Chan,
            [
                text("notes"),
                text("internal"),
                seq([
                    text("n1 "),
                    func(
                        Builtin::Chan,
                        [text("inner"), text("internal"), text("n2")],
                    ),
                ]),
            ],
        ),
    ]);
    let out = engine().run(&pattern(root), 0).unwrap();
    assert_eq!(out.main(), "main shared ");
    assert_eq!(out.get("pub"), Some("shared "));
    assert_eq!(out.get("secret"), Some("hidden"));
    assert_eq!(out.get("notes"), Some("n1 n2"));
    assert_eq!(out.get("inner"), Some("n2"));
    let secret = out.channels.iter().find(|c| c.name == "secret").unwrap();
    assert_eq!(secret.visibility, ChannelVisibility::Private);
    assert_eq!(out.channel_names().next(), Some("main"));
}

#[test]
fn runaway_block_times_out() {
    let mut engine = Engine::builder().timeout_ms(20).build().unwrap();
    let root = seq([f(Builtin::Rep, &["4000000000"]), block([text("")])]);
    let err = engine.run(&pattern(root), 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout(Duration::from_millis(20)));
}

#[test]
fn repeated_escape_times_out() {
    let mut engine = Engine::builder().timeout_ms(20).build().unwrap();
    let started = Instant::now();
    let err = engine
        .run(&pattern(esc_times('s', 50_000_000)), 0)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout(Duration::from_millis(20)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn self_referencing_alternatives_time_out() {
    let mut engine = Engine::builder()
        .max_stack_depth(100_000_000)
        .timeout_ms(50)
        .build()
        .unwrap();
    let root = seq([
        define(
            "tale",
            &[],
            block([
                call("tale", []),
                seq([text("and then "), call("tale", [])]),
            ]),
        ),
        call("tale", []),
    ]);
    let err = engine.run(&pattern(root), 3).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout(Duration::from_millis(50)));
}

#[test]
fn unbounded_recursion_overflows_the_stack() {
    let root = seq([
        define("again", &[], seq([text("x"), call("again", [])])),
        call("again", []),
    ]);
    let err = engine().run(&pattern(root), 0).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::StackOverflow(_)));
}

#[test]
fn size_limit_stops_the_run() {
    let mut engine = Engine::builder().size_limit(10).build().unwrap();
    let root = seq([f(Builtin::Rep, &["20"]), choice(&["ab"])]);
    let err = engine.run(&pattern(root), 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CharacterLimit(10));

    let root = seq([f(Builtin::Rep, &["5"]), choice(&["ab"])]);
    assert_eq!(engine.run(&pattern(root), 0).unwrap().main(), "ababababab");
}

#[test]
fn indefinite_article_follows_the_next_word() {
    assert_eq!(render(seq([esc('a'), text(" owl")]), 0), "an owl");
    assert_eq!(render(seq([esc('a'), text(" unicorn")]), 0), "a unicorn");
    let root = seq([
        esc('a'),
        text(" "),
        f(Builtin::Target, &["thing"]),
        text(" rolled"),
        f(Builtin::Send, &["thing", "egg"]),
    ]);
    assert_eq!(render(root, 0), "an egg rolled");
}

#[test]
fn serial_run_keeps_state_between_segments() {
    let mut engine = engine();
    let root = seq([
        f(Builtin::VarNum, &["n", "1"]),
        f(Builtin::VarGet, &["n"]),
        func(Builtin::Yield, []),
        f(Builtin::VarNum, &["n", "2"]),
        f(Builtin::VarGet, &["n"]),
        func(Builtin::Yield, []),
    ]);
    let p = pattern(root);
    let mut serial = engine.run_serial(&p, 0);
    assert_eq!(serial.next().unwrap().unwrap().main(), "1");
    assert_eq!(serial.next().unwrap().unwrap().main(), "2");
    assert!(serial.next().is_none());
    assert!(serial.next().is_none());
}

#[test]
fn serial_run_stops_after_an_error() {
    let mut engine = engine();
    let root = seq([
        text("ok"),
        func(Builtin::Yield, []),
        f(Builtin::VarGet, &["missing"]),
        text("never"),
    ]);
    let p = pattern(root);
    let results: Vec<_> = engine.run_serial(&p, 0).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().main(), "ok");
    assert_eq!(
        results[1].as_ref().unwrap_err().kind,
        ErrorKind::UndefinedVariable("missing".into())
    );
}

#[test]
fn subroutine_overloads_by_arity() {
    let root = seq([
        define("hi", &[], text("Hi!")),
        define(
            "hi",
            &["who"],
            seq([text("Hi, "), f(Builtin::Arg, &["who"]), text("!")]),
        ),
        call("hi", []),
        text(" "),
        call("hi", [text("Ada")]),
    ]);
    assert_eq!(render(root, 0), "Hi! Hi, Ada!");
}

#[test]
fn carrier_match_repeats_the_same_entry() {
    let vocab = TableVocabulary::new().with_table(Table {
        name: "noun".into(),
        subtypes: vec![],
        entries: ["ant", "bee", "cow", "doe", "elk"]
            .iter()
            .map(|w| Entry::new(&[*w], &[]))
            .collect(),
    });
    let matched = || {
        query(Query {
            table: "noun".into(),
            carrier: Carrier {
                matches: vec!["m".into()],
                uniques: vec![],
            },
            ..Query::default()
        })
    };
    let mut engine = Engine::builder().with_vocabulary(vocab).build().unwrap();
    let out = engine
        .run(&pattern(seq([matched(), text("/"), matched()])), 12)
        .unwrap();
    let (a, b) = out.main().split_once('/').unwrap();
    assert_eq!(a, b);
}

#[test]
fn fixtures_load_and_run() {
    let mut engine = Engine::builder()
        .config("tests/fixtures/config.ron")
        .vocabulary("tests/fixtures/vocabulary.ron")
        .build()
        .unwrap();
    assert_eq!(engine.config().max_stack_depth, 128);
    let out = engine
        .run_file(Path::new("tests/fixtures/greeting.ron"), 5)
        .unwrap();
    let text = out.main();
    assert!(
        text.starts_with("Hello, ") || text.starts_with("Greetings, "),
        "{text}"
    );
    assert!(text.contains(", cat! ") || text.contains(", dog! "), "{text}");
    assert!(text.ends_with("! «a wolves»"), "{text}");
}

#[test]
fn split_vocabulary_entry_takes_a_complement() {
    let mut engine = Engine::builder()
        .vocabulary("tests/fixtures/vocabulary.ron")
        .build()
        .unwrap();
    let root = query(Query {
        table: "verb".into(),
        complement: Some(text("nothing")),
        ..Query::default()
    });
    assert_eq!(engine.run(&pattern(root), 0).unwrap().main(), "give nothing up");
}

#[test]
fn invalid_config_fixture_is_rejected() {
    let err = Engine::builder()
        .config("tests/fixtures/bad_config.ron")
        .build();
    assert!(matches!(err, Err(EngineError::Config(_))));
    let config = EngineConfig::load_from_ron(Path::new("tests/fixtures/config.ron")).unwrap();
    assert_eq!(config.format.open_quote, "«");
}

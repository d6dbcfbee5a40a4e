/// Built-in functions callable from patterns, with their signatures and
/// the names they are looked up by.

use serde::{Deserialize, Serialize};

use ParamKind::{Number as N, Pattern as P, Text as T};

/// How an argument is handed to a built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Passed as an unevaluated sub-tree.
    Pattern,
    /// Evaluated in isolation and passed as text.
    Text,
    /// Evaluated in isolation and parsed as a number.
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub params: &'static [ParamKind],
    /// Kind of any arguments past `params`, if the function is variadic.
    pub variadic: Option<ParamKind>,
}

impl Signature {
    const fn fixed(params: &'static [ParamKind]) -> Self {
        Self {
            params,
            variadic: None,
        }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        match self.variadic {
            Some(_) => argc >= self.params.len(),
            None => argc == self.params.len(),
        }
    }

    /// Kind of the argument at position `i`.
    pub fn kind_of(&self, i: usize) -> ParamKind {
        self.params
            .get(i)
            .copied()
            .or(self.variadic)
            .unwrap_or(ParamKind::Pattern)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    // Block attributes, consumed by the next block.
    Rep,
    Sep,
    Series,
    SeriesOxford,
    RepSep,
    Before,
    After,
    Start,
    End,
    Chance,
    Init,
    Persist,
    // Synchronizers.
    Sync,
    SyncUse,
    SyncPin,
    SyncUnpin,
    SyncStep,
    SyncReset,
    // Formatting.
    Case,
    CapsInfer,
    NumFmt,
    NumFmtScoped,
    Quote,
    // Block state queries.
    RepNum,
    RepIndex,
    RepCount,
    RepRem,
    ItemIndex,
    Depth,
    First,
    NotFirst,
    Last,
    NotLast,
    Middle,
    Ends,
    Odd,
    Even,
    Nth,
    // Channels and targets.
    Chan,
    Target,
    Send,
    SendOver,
    TargetVal,
    ClearTarget,
    Len,
    // Values.
    Num,
    VarSet,
    VarNum,
    VarList,
    VarGet,
    VarDelete,
    ListItem,
    Arg,
    If,
    IfElse,
    // Control.
    Yield,
    Branch,
    Match,
    Group,
    In,
}

/// Lookup names, aliases included. Overloads share a name and differ in
/// arity.
const NAMES: &[(&str, Builtin)] = &[
    ("rep", Builtin::Rep),
    ("r", Builtin::Rep),
    ("sep", Builtin::Sep),
    ("s", Builtin::Sep),
    ("series", Builtin::Series),
    ("series", Builtin::SeriesOxford),
    ("rs", Builtin::RepSep),
    ("before", Builtin::Before),
    ("after", Builtin::After),
    ("start", Builtin::Start),
    ("end", Builtin::End),
    ("chance", Builtin::Chance),
    ("init", Builtin::Init),
    ("persist", Builtin::Persist),
    ("sync", Builtin::Sync),
    ("x", Builtin::Sync),
    ("sync", Builtin::SyncUse),
    ("x", Builtin::SyncUse),
    ("xpin", Builtin::SyncPin),
    ("xunpin", Builtin::SyncUnpin),
    ("xstep", Builtin::SyncStep),
    ("xreset", Builtin::SyncReset),
    ("case", Builtin::Case),
    ("caps", Builtin::Case),
    ("capsinfer", Builtin::CapsInfer),
    ("numfmt", Builtin::NumFmt),
    ("numfmt", Builtin::NumFmtScoped),
    ("quote", Builtin::Quote),
    ("q", Builtin::Quote),
    ("repnum", Builtin::RepNum),
    ("rn", Builtin::RepNum),
    ("repindex", Builtin::RepIndex),
    ("i", Builtin::RepIndex),
    ("repcount", Builtin::RepCount),
    ("rc", Builtin::RepCount),
    ("reprem", Builtin::RepRem),
    ("itemindex", Builtin::ItemIndex),
    ("depth", Builtin::Depth),
    ("first", Builtin::First),
    ("notfirst", Builtin::NotFirst),
    ("last", Builtin::Last),
    ("notlast", Builtin::NotLast),
    ("middle", Builtin::Middle),
    ("ends", Builtin::Ends),
    ("odd", Builtin::Odd),
    ("even", Builtin::Even),
    ("nth", Builtin::Nth),
    ("chan", Builtin::Chan),
    ("target", Builtin::Target),
    ("t", Builtin::Target),
    ("send", Builtin::Send),
    ("osend", Builtin::SendOver),
    ("get", Builtin::TargetVal),
    ("clrt", Builtin::ClearTarget),
    ("len", Builtin::Len),
    ("num", Builtin::Num),
    ("n", Builtin::Num),
    ("vs", Builtin::VarSet),
    ("vn", Builtin::VarNum),
    ("vl", Builtin::VarList),
    ("v", Builtin::VarGet),
    ("vdel", Builtin::VarDelete),
    ("item", Builtin::ListItem),
    ("arg", Builtin::Arg),
    ("if", Builtin::If),
    ("if", Builtin::IfElse),
    ("yield", Builtin::Yield),
    ("branch", Builtin::Branch),
    ("match", Builtin::Match),
    ("group", Builtin::Group),
    ("in", Builtin::In),
];

impl Builtin {
    pub fn signature(self) -> Signature {
        use Builtin::*;
        match self {
            Chance | Init => Signature::fixed(&[N]),
            Sep | Before | After | Start | End | Quote => Signature::fixed(&[P]),
            Series => Signature::fixed(&[P, P]),
            SeriesOxford => Signature::fixed(&[P, P, P]),
            RepSep => Signature::fixed(&[T, P]),
            Rep | Persist | Case | CapsInfer | NumFmt | SyncUse | SyncPin | SyncUnpin | SyncStep
            | SyncReset | Target | TargetVal | ClearTarget | Len | VarGet | VarDelete | Arg
            | Group | In => Signature::fixed(&[T]),
            Sync | Send | SendOver | VarSet => Signature::fixed(&[T, T]),
            NumFmtScoped => Signature::fixed(&[T, P]),
            RepNum | RepIndex | RepCount | RepRem | ItemIndex | Depth | Yield | Match => {
                Signature::fixed(&[])
            }
            First | NotFirst | Last | NotLast | Middle | Ends | Odd | Even => {
                Signature::fixed(&[P])
            }
            Nth => Signature::fixed(&[N, N, P]),
            Chan => Signature::fixed(&[T, T, P]),
            Num => Signature::fixed(&[N, N]),
            VarNum | ListItem => Signature::fixed(&[T, N]),
            VarList => Signature {
                params: &[T],
                variadic: Some(T),
            },
            If => Signature::fixed(&[T, P]),
            IfElse => Signature::fixed(&[T, P, P]),
            Branch => Signature::fixed(&[T, P]),
        }
    }

    /// Primary lookup name.
    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, b)| *b == self)
            .map_or("?", |&(name, _)| name)
    }

    /// Resolves `name` called with `argc` arguments.
    pub fn lookup(name: &str, argc: usize) -> Option<Builtin> {
        NAMES
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, b)| b)
            .find(|b| b.signature().accepts(argc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloads_resolve_by_arity() {
        assert_eq!(Builtin::lookup("series", 2), Some(Builtin::Series));
        assert_eq!(Builtin::lookup("series", 3), Some(Builtin::SeriesOxford));
        assert_eq!(Builtin::lookup("if", 3), Some(Builtin::IfElse));
        assert_eq!(Builtin::lookup("x", 1), Some(Builtin::SyncUse));
        assert_eq!(Builtin::lookup("x", 2), Some(Builtin::Sync));
        assert_eq!(Builtin::lookup("numfmt", 2), Some(Builtin::NumFmtScoped));
    }

    #[test]
    fn aliases_and_case() {
        assert_eq!(Builtin::lookup("R", 1), Some(Builtin::Rep));
        assert_eq!(Builtin::lookup("caps", 1), Some(Builtin::Case));
        assert_eq!(Builtin::lookup("rep", 2), None);
        assert_eq!(Builtin::lookup("nope", 0), None);
    }

    #[test]
    fn variadic_lists() {
        assert_eq!(Builtin::lookup("vl", 1), Some(Builtin::VarList));
        assert_eq!(Builtin::lookup("vl", 5), Some(Builtin::VarList));
        let sig = Builtin::VarList.signature();
        assert_eq!(sig.kind_of(4), ParamKind::Text);
    }

    #[test]
    fn every_builtin_has_a_name() {
        assert_eq!(Builtin::RepSep.name(), "rs");
        assert_eq!(Builtin::SyncUse.name(), "sync");
        assert_eq!(Builtin::In.name(), "in");
    }
}

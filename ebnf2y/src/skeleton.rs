//! Skeleton Generator
//!
//! Renders a BNF grammar as a yacc/bison grammar file. Every alternative gets
//! an action building a tree node, tagged with the production name for the
//! first alternative and the name with an ordinal suffix for the others:
//!
//! ```text
//! Opt:
//! 	'a' 'c'
//! 		{ $$ = node("Opt", 2, $1, $2); }
//! 	| 'a' 'b' 'c'
//! 		{ $$ = node("Opt1", 3, $1, $2, $3); }
//! 	;
//! ```
//!
//! Only productions reachable from the start production are rendered. Token
//! productions (lower-case names) and literals become `%token` declarations,
//! except single printable characters, which are written as character
//! literals. If two tokens are spelled the same, or a token is spelled like a
//! rule, the later one gets a `_2`, `_3`, ... suffix.

use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
    },
    fmt::{
        self,
        Display,
    },
};

use crate::{
    grammar::{
        quote,
        Error,
        Grammar,
        Literal,
        Name,
        ProductionId,
        Term,
    },
    utils::IsLast,
};

#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    /// Name of the start production.
    pub start: String,

    /// Prepended to every token name.
    pub prefix: String,
}

impl Skeleton {
    pub fn new(start: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            prefix: prefix.into(),
        }
    }

    /// Renders `grammar`, which must be in BNF form.
    ///
    /// The output only depends on `grammar` and `self`.
    pub fn render(&self, grammar: &Grammar) -> Result<String, Error> {
        assert!(grammar.is_bnf(), "skeleton needs a grammar in BNF form");
        grammar.check_references()?;
        let start = grammar.start(&self.start)?;

        let reachable = grammar.reachable(start);
        let rules = grammar
            .iter()
            .filter(|(id, production)| {
                reachable.contains(id) && (!production.is_token() || *id == start)
            })
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        // token names must not clash with rule names or with each other
        let mut token_names = TokenNames {
            names: HashMap::new(),
            taken: grammar
                .iter()
                .filter(|(_, production)| !production.is_token())
                .map(|(_, production)| production.name.to_string())
                .collect(),
        };
        let mut tokens = BTreeMap::new();
        for id in &rules {
            let Some(production) = grammar.get(*id)
            else {
                continue;
            };
            for alternative in production.body.alternatives() {
                for term in alternative.terms() {
                    let Some(key) = TokenKey::of(term)
                    else {
                        continue;
                    };
                    if token_names.names.contains_key(&key) {
                        continue;
                    }
                    if let Symbol::Token { name, comment } = self.symbol(grammar, term) {
                        let name = token_names.assign(key, name);
                        tokens.insert(name, comment);
                    }
                }
            }
        }

        let output = Output {
            skeleton: self,
            grammar,
            start,
            rules,
            tokens,
            token_names: token_names.names,
        }
        .to_string();
        tracing::trace!("skeleton:\n{output}");

        Ok(output)
    }

    fn symbol(&self, grammar: &Grammar, term: &Term) -> Symbol {
        match term {
            Term::Ref(id) => {
                match grammar.get(*id) {
                    Some(production) if production.is_token() => {
                        Symbol::Token {
                            name: self.token_name(&spell(production.name.as_str())),
                            comment: production.name.to_string(),
                        }
                    }
                    Some(production) => Symbol::Rule(production.name.clone()),
                    None => Symbol::Rule(format!("__removed{}", id.index()).into()),
                }
            }
            Term::Token(literal) => self.literal_symbol(literal),
            Term::Group(_) | Term::Option(_) | Term::Repetition(_) => {
                unreachable!("nested expression in BNF grammar")
            }
        }
    }

    fn literal_symbol(&self, literal: &Literal) -> Symbol {
        let spelled = match &literal.until {
            Some(until) => format!("{}_TO_{}", spell(&literal.text), spell(until)),
            None => {
                let mut chars = literal.text.chars();
                if let (Some(c), None) = (chars.next(), chars.next()) {
                    if c.is_ascii_graphic() {
                        return Symbol::Char(c);
                    }
                }
                spell(&literal.text)
            }
        };

        let mut comment = quote(&literal.text);
        if let Some(until) = &literal.until {
            comment.push_str(" … ");
            comment.push_str(&quote(until));
        }

        Symbol::Token {
            name: self.token_name(&spelled),
            comment: comment.replace("*/", "*\\/"),
        }
    }

    fn token_name(&self, spelled: &str) -> String {
        let mut name = format!("{}{spelled}", self.prefix);
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            name.insert(0, '_');
        }
        name
    }
}

/// Identity of a token in the grammar.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
enum TokenKey {
    Production(ProductionId),
    Literal(Literal),
}

impl TokenKey {
    fn of(term: &Term) -> Option<Self> {
        match term {
            Term::Ref(id) => Some(TokenKey::Production(*id)),
            Term::Token(literal) => Some(TokenKey::Literal(literal.clone())),
            _ => None,
        }
    }
}

/// Distinct names for the tokens of one grammar.
struct TokenNames {
    names: HashMap<TokenKey, String>,
    taken: HashSet<String>,
}

impl TokenNames {
    /// Gives `key` the name `spelled`, or `spelled_2`, `spelled_3`, ... if
    /// that's taken by another token or a rule.
    fn assign(&mut self, key: TokenKey, spelled: String) -> String {
        let mut name = spelled.clone();
        let mut ordinal = 2;
        while self.taken.contains(&name) {
            name = format!("{spelled}_{ordinal}");
            ordinal += 1;
        }

        self.taken.insert(name.clone());
        self.names.insert(key, name.clone());
        name
    }
}

enum Symbol {
    Rule(Name),
    Char(char),
    Token { name: String, comment: String },
}

impl Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Rule(name) => write!(f, "{name}"),
            Symbol::Char('\'') => f.write_str(r"'\''"),
            Symbol::Char('\\') => f.write_str(r"'\\'"),
            Symbol::Char(c) => write!(f, "'{c}'"),
            Symbol::Token { name, .. } => f.write_str(name),
        }
    }
}

/// Spells a token with upper-case letters, digits and `_`. Punctuation is
/// spelled out, other characters are written as their code point.
fn spell(text: &str) -> String {
    if text.is_empty() {
        return "EMPTY".to_owned();
    }

    let mut segments = vec![];
    let mut word = String::new();

    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c.to_ascii_uppercase());
            continue;
        }

        if !word.is_empty() {
            segments.push(std::mem::take(&mut word));
        }
        segments.push(match punctuation_name(c) {
            Some(name) => name.to_owned(),
            None => format!("U{:04X}", c as u32),
        });
    }

    if !word.is_empty() {
        segments.push(word);
    }

    segments.join("_")
}

fn punctuation_name(c: char) -> Option<&'static str> {
    let name = match c {
        ' ' => "SPACE",
        '!' => "BANG",
        '"' => "DQUOTE",
        '#' => "HASH",
        '$' => "DOLLAR",
        '%' => "PERCENT",
        '&' => "AMP",
        '\'' => "QUOTE",
        '(' => "LPAREN",
        ')' => "RPAREN",
        '*' => "STAR",
        '+' => "PLUS",
        ',' => "COMMA",
        '-' => "MINUS",
        '.' => "DOT",
        '/' => "SLASH",
        ':' => "COLON",
        ';' => "SEMI",
        '<' => "LT",
        '=' => "EQ",
        '>' => "GT",
        '?' => "QUEST",
        '@' => "AT",
        '[' => "LBRACK",
        '\\' => "BACKSLASH",
        ']' => "RBRACK",
        '^' => "CARET",
        '`' => "BACKQUOTE",
        '{' => "LBRACE",
        '|' => "PIPE",
        '}' => "RBRACE",
        '~' => "TILDE",
        _ => return None,
    };
    Some(name)
}

struct Output<'a> {
    skeleton: &'a Skeleton,
    grammar: &'a Grammar,
    start: ProductionId,
    rules: Vec<ProductionId>,
    tokens: BTreeMap<String, String>,
    token_names: HashMap<TokenKey, String>,
}

impl<'a> Output<'a> {
    fn symbol(&self, term: &Term) -> Symbol {
        match self.skeleton.symbol(self.grammar, term) {
            Symbol::Token { name, comment } => {
                let name = TokenKey::of(term)
                    .and_then(|key| self.token_names.get(&key).cloned())
                    .unwrap_or(name);
                Symbol::Token { name, comment }
            }
            symbol => symbol,
        }
    }
}

impl<'a> Display for Output<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "%{{")?;
        writeln!(f, "#define YYSTYPE void *")?;
        writeln!(f, "extern void *node(const char *tag, int n, ...);")?;
        writeln!(f, "%}}")?;
        writeln!(f)?;

        if !self.tokens.is_empty() {
            for (name, comment) in &self.tokens {
                writeln!(f, "%token\t{name}\t/* {comment} */")?;
            }
            writeln!(f)?;
        }

        if let Some(start) = self.grammar.name(self.start) {
            writeln!(f, "%start\t{start}")?;
            writeln!(f)?;
        }

        writeln!(f, "%%")?;

        for id in &self.rules {
            let Some(production) = self.grammar.get(*id)
            else {
                continue;
            };

            writeln!(f)?;
            writeln!(f, "{}:", production.name)?;

            for (i, alternative) in production.body.alternatives().iter().enumerate() {
                f.write_str(if i == 0 { "\t" } else { "\t| " })?;

                if alternative.is_empty() {
                    f.write_str("/* empty */")?;
                }
                for (term, is_last) in IsLast::new(alternative.terms().iter()) {
                    write!(f, "{}", self.symbol(term))?;
                    if !is_last {
                        f.write_str(" ")?;
                    }
                }
                writeln!(f)?;

                let n = alternative.terms().len();
                write!(f, "\t\t{{ $$ = node(\"{}", production.name)?;
                if i > 0 {
                    write!(f, "{i}")?;
                }
                write!(f, "\", {n}")?;
                for k in 1..=n {
                    write!(f, ", ${k}")?;
                }
                writeln!(f, "); }}")?;
            }

            writeln!(f, "\t;")?;
        }

        writeln!(f)?;
        writeln!(f, "%%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        desugar::desugar,
        inline::{
            inline,
            InlineLevel,
        },
        utils::test::{
            read,
            DEMO,
            DIGITS,
            OPTIONAL,
        },
    };

    fn token(prefix: &str, literal: Literal) -> String {
        Skeleton::new("", prefix).literal_symbol(&literal).to_string()
    }

    #[test]
    fn it_renders_actions_per_alternative() {
        let bnf = desugar(&read(OPTIONAL), "Opt").unwrap();
        let inlined = inline(&bnf, InlineLevel::UsedOnce, "Opt").unwrap();
        let output = Skeleton::new("Opt", "").render(&inlined).unwrap();

        assert_eq!(
            output,
            r#"%{
#define YYSTYPE void *
extern void *node(const char *tag, int n, ...);
%}

%start	Opt

%%

Opt:
	'a' 'c'
		{ $$ = node("Opt", 2, $1, $2); }
	| 'a' 'b' 'c'
		{ $$ = node("Opt1", 3, $1, $2, $3); }
	;

%%
"#
        );
    }

    #[test]
    fn it_declares_token_productions() {
        let bnf = desugar(&read(DIGITS), "Digits").unwrap();
        let output = Skeleton::new("Digits", "t").render(&bnf).unwrap();

        assert!(output.contains("%token\ttDIGIT\t/* digit */\n"));
        assert!(output.contains("Digits:\n\ttDIGIT Digits1\n"));
        assert!(output.contains(
            "Digits1:\n\t/* empty */\n\t\t{ $$ = node(\"Digits1\", 0); }\n\t| Digits1 tDIGIT\n\t\t{ $$ = node(\"Digits11\", 2, $1, $2); }\n\t;\n"
        ));
        assert!(!output.contains("digit:"));
    }

    #[test]
    fn it_names_tokens() {
        assert_eq!(token("", Literal::new("+")), "'+'");
        assert_eq!(token("", Literal::new("'")), r"'\''");
        assert_eq!(token("", Literal::new("\\")), r"'\\'");
        assert_eq!(token("p", Literal::new("true")), "pTRUE");
        assert_eq!(token("", Literal::new("10")), "_10");
        assert_eq!(token("p", Literal::new("10")), "p10");
        assert_eq!(token("", Literal::new("&^")), "AMP_CARET");
        assert_eq!(token("p", Literal::new("<<")), "pLT_LT");
        assert_eq!(token("", Literal::new("a+b")), "A_PLUS_B");
        assert_eq!(token("", Literal::new("π")), "U03C0");
        assert_eq!(token("", Literal::new(" ")), "SPACE");
        assert_eq!(token("", Literal::new("")), "EMPTY");
        assert_eq!(token("p", Literal::range("a", "z")), "pA_TO_Z");
    }

    #[test]
    fn it_keeps_tokens_with_the_same_spelling_apart() {
        let g = read(
            r#"
S = "a_b" "A_B" X x | "a_b" .
X = "q" .
x = .
            "#,
        );
        let output = Skeleton::new("S", "").render(&g).unwrap();

        assert!(output.contains("%token\tA_B\t/* \"a_b\" */\n"));
        assert!(output.contains("%token\tA_B_2\t/* \"A_B\" */\n"));
        assert!(output.contains("%token\tX_2\t/* x */\n"));
        assert!(output.contains("\tA_B A_B_2 X X_2\n"));
        assert!(output.contains("\t| A_B\n"));
        assert!(output.contains("\nX:\n\t'q'\n"));
    }

    #[test]
    fn it_renders_only_reachable_productions() {
        let g = read(
            r#"
S = A "," ident .
A = "x" .
Unused = "u" .
ident = .
            "#,
        );
        let output = Skeleton::new("S", "").render(&g).unwrap();

        assert!(output.contains("\nS:\n"));
        assert!(output.contains("\nA:\n"));
        assert!(!output.contains("Unused"));
        assert!(output.contains("%token\tIDENT\t/* ident */\n"));
        assert!(output.contains("\tA ',' IDENT\n"));
    }

    #[test]
    fn it_is_deterministic() {
        let bnf = desugar(&read(DEMO), "Expression").unwrap();
        let skeleton = Skeleton::new("Expression", "t");

        let first = skeleton.render(&bnf).unwrap();
        let second = skeleton.render(&bnf.clone()).unwrap();
        assert_eq!(first, second);

        assert!(first.contains("%token\ttANDNOT\t/* andnot */\n"));
        assert!(first.contains("%start\tExpression\n"));
    }

    #[test]
    fn it_fails_for_missing_start() {
        let g = read("A = .");
        assert!(matches!(
            Skeleton::new("SourceFile", "").render(&g),
            Err(Error::StartNotFound(_))
        ));
    }
}

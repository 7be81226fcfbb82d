use nom::{
    branch::alt,
    bytes::complete::{
        escaped_transform,
        is_not,
        tag,
        take,
        take_until,
        take_while,
    },
    character::complete::{
        char,
        multispace0,
        none_of,
        satisfy,
    },
    combinator::{
        all_consuming,
        cut,
        map,
        not,
        opt,
        peek,
        recognize,
        value,
    },
    error::{
        context,
        ErrorKind,
        FromExternalError,
        ParseError,
        VerboseError,
    },
    multi::{
        many0,
        many0_count,
        separated_list1,
    },
    sequence::{
        delimited,
        pair,
        preceded,
        terminated,
        tuple,
    },
    IResult,
    Parser,
};

use super::ast::{
    Alternatives,
    Grammar,
    Id,
    Literal,
    Production,
    Sequence,
    Term,
};

type Res<'a, U> = IResult<&'a str, U, VerboseError<&'a str>>;

/// consumes a single `// line` or `/* block */` comment
fn consume_comment(input: &str) -> Res<()> {
    alt((
        value((), pair(tag("//"), opt(is_not("\r\n")))),
        value((), tuple((tag("/*"), take_until("*/"), tag("*/")))),
    ))(input)
}

/// consumes whitespace and comments
fn consume_wsc(input: &str) -> Res<()> {
    value(
        (),
        terminated(
            many0_count(preceded(multispace0, consume_comment)),
            multispace0,
        ),
    )(input)
}

/// consumes all whitespace and comments before calling the parser `f`
fn wsc<'a, U>(f: impl FnMut(&'a str) -> Res<'a, U>) -> impl FnMut(&'a str) -> Res<'a, U> {
    preceded(consume_wsc, f)
}

pub(super) fn parse_grammar_complete(input: &str) -> Res<Grammar> {
    all_consuming(terminated(parse_grammar, consume_wsc))(input)
}

fn parse_grammar(input: &str) -> Res<Grammar> {
    context("grammar", map(many0(parse_production), Grammar))(input)
}

fn parse_production(input: &str) -> Res<Production> {
    context(
        "production",
        map(
            tuple((
                parse_id,
                cut(wsc(char('='))),
                cut(parse_alternatives),
                cut(wsc(char('.'))),
            )),
            |(lhs, _, rhs, _)| Production { lhs, rhs },
        ),
    )(input)
}

fn parse_id(input: &str) -> Res<Id> {
    context(
        "identifier",
        map(
            wsc(recognize(pair(
                satisfy(|c: char| c.is_alphabetic() || c == '_'),
                take_while(|c: char| c.is_alphanumeric() || c == '_'),
            ))),
            Id,
        ),
    )(input)
}

fn parse_alternatives(input: &str) -> Res<Alternatives> {
    context(
        "expression",
        map(
            separated_list1(wsc(char('|')), parse_sequence),
            Alternatives,
        ),
    )(input)
}

fn parse_sequence(input: &str) -> Res<Sequence> {
    map(many0(parse_term), Sequence)(input)
}

fn parse_term(input: &str) -> Res<Term> {
    context(
        "term",
        alt((
            parse_token,
            map(parse_nested('(', ')'), Term::Group),
            map(parse_nested('[', ']'), Term::Option),
            map(parse_nested('{', '}'), Term::Repetition),
            map(parse_rule_ref, Term::Rule),
        )),
    )(input)
}

/// a production name used as a term. if it's followed by `=`, it's the start
/// of the next production and the current one lacks its `.`.
fn parse_rule_ref(input: &str) -> Res<Id> {
    terminated(parse_id, peek(not(wsc(char('=')))))(input)
}

fn parse_nested<'a>(open: char, close: char) -> impl FnMut(&'a str) -> Res<'a, Alternatives<'a>> {
    delimited(
        wsc(char(open)),
        cut(parse_alternatives),
        cut(wsc(char(close))),
    )
}

/// a token, optionally followed by `…` and a second token
fn parse_token(input: &str) -> Res<Term> {
    let (input, first) = parse_literal(input)?;
    let (input, last) = opt(preceded(
        wsc(alt((tag("…"), tag("...")))),
        cut(parse_literal),
    ))(input)?;

    let term = match last {
        Some(last) => Term::Range(first, last),
        None => Term::Literal(first),
    };

    Ok((input, term))
}

fn parse_literal(input: &str) -> Res<Literal> {
    context(
        "token",
        wsc(alt((parse_interpreted_literal, parse_raw_literal))),
    )(input)
}

/// `"..."` with escapes
fn parse_interpreted_literal(input: &str) -> Res<Literal> {
    map(
        preceded(
            char('"'),
            cut(terminated(
                // escaped_transform doesn't accept empty input
                map(
                    opt(escaped_transform(
                        none_of("\"\r\n\\"),
                        '\\',
                        parse_literal_escape,
                    )),
                    Option::unwrap_or_default,
                ),
                char('"'),
            )),
        ),
        Literal,
    )(input)
}

/// `` `...` `` without escapes
fn parse_raw_literal(input: &str) -> Res<Literal> {
    map(
        preceded(
            char('`'),
            cut(terminated(take_while(|c: char| c != '`'), char('`'))),
        ),
        Literal::from,
    )(input)
}

fn parse_escaped_unicode(input: &str) -> Res<char> {
    let (input, code_point) = alt((
        preceded(char('x'), take(2usize).and_then(hex_u32)),
        preceded(char('u'), take(4usize).and_then(hex_u32)),
        preceded(char('U'), take(8usize).and_then(hex_u32)),
    ))(input)?;
    let code_point = char::from_u32(code_point).ok_or_else(|| {
        nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::EscapedTransform,
        ))
    })?;
    Ok((input, code_point))
}

fn hex_u32(input: &str) -> Res<u32> {
    let x = u32::from_str_radix(input, 16).map_err(|e| {
        nom::Err::Error(VerboseError::from_external_error(
            input,
            ErrorKind::HexDigit,
            e,
        ))
    })?;
    Ok((input, x))
}

fn parse_literal_escape(input: &str) -> Res<char> {
    context(
        "token escape",
        alt((
            char('\\'),
            char('"'),
            value('\n', char('n')),
            value('\r', char('r')),
            value('\t', char('t')),
            parse_escaped_unicode,
        )),
    )(input)
}

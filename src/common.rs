//! Stock modes shared by most grammars.
//!
//! Each function returns a fresh [`ModeDef`]; adjust it with the builder methods or
//! [`ModeDef::inherit`] before placing it in a grammar.

use crate::mode::{Guard, ModeDef, ModeRef};
use crate::pattern::{
    self, BINARY_NUMBER_RE, C_NUMBER_RE, IDENT_RE, NUMBER_RE, UNDERSCORE_IDENT_RE,
};

/// Markers that get the `doctag` scope inside comments.
const DOCTAGS: &str = "TODO|FIXME|NOTE|BUG|OPTIMIZE|HACK|XXX";

/// A backslash followed by any character, including a newline.
#[must_use]
pub fn backslash_escape() -> ModeDef {
    ModeDef::new().label("escape").begin(r"\\[\s\S]").relevance(0)
}

/// Single quoted string; a raw newline is illegal inside it.
#[must_use]
pub fn apos_string() -> ModeDef {
    ModeDef::new()
        .scope("string")
        .begin("'")
        .end("'")
        .illegal(r"\n")
        .contains(vec![backslash_escape().into()])
}

/// Double quoted string; a raw newline is illegal inside it.
#[must_use]
pub fn quote_string() -> ModeDef {
    ModeDef::new()
        .scope("string")
        .begin("\"")
        .end("\"")
        .illegal(r"\n")
        .contains(vec![backslash_escape().into()])
}

/// A comment from `begin` to `end`, highlighting `TODO:`-style markers.
#[must_use]
pub fn comment(begin: &str, end: &str) -> ModeDef {
    let doctag = ModeDef {
        exclude_begin: true,
        ..ModeDef::new()
            .scope("doctag")
            .begin(format!(r"[ ]*(?=(?:{DOCTAGS}):)"))
            .end(format!("(?:{DOCTAGS}):"))
            .relevance(0)
    };
    ModeDef::new()
        .scope("comment")
        .begin(begin)
        .end(end)
        .contains(vec![doctag.into()])
}

#[must_use]
pub fn c_line_comment() -> ModeDef {
    comment("//", "$")
}

#[must_use]
pub fn c_block_comment() -> ModeDef {
    comment(r"/\*", r"\*/")
}

#[must_use]
pub fn hash_comment() -> ModeDef {
    comment("#", "$")
}

#[must_use]
pub fn number() -> ModeDef {
    ModeDef::new().scope("number").matching(NUMBER_RE).relevance(0)
}

/// Decimal, hexadecimal and exponent forms, with an optional leading minus.
#[must_use]
pub fn c_number() -> ModeDef {
    ModeDef::new().scope("number").matching(C_NUMBER_RE).relevance(0)
}

#[must_use]
pub fn binary_number() -> ModeDef {
    ModeDef::new().scope("number").matching(BINARY_NUMBER_RE).relevance(0)
}

/// A `/.../flags` literal. Only begins where a closing slash follows on the same line.
#[must_use]
pub fn regexp() -> ModeDef {
    let class = ModeDef::new()
        .begin(r"\[")
        .end(r"\]")
        .relevance(0)
        .contains(vec![backslash_escape().into()]);
    ModeDef::new()
        .scope("regexp")
        .begin(r"/(?=[^/\n]*/)")
        .end(r"/[gimuy]*")
        .contains(vec![backslash_escape().into(), class.into()])
}

#[must_use]
pub fn title() -> ModeDef {
    ModeDef::new().scope("title").matching(IDENT_RE).relevance(0)
}

#[must_use]
pub fn underscore_title() -> ModeDef {
    ModeDef::new().scope("title").matching(UNDERSCORE_IDENT_RE).relevance(0)
}

/// Swallows `.name` so that a method named like a keyword is not classified.
#[must_use]
pub fn method_guard() -> ModeDef {
    ModeDef::new()
        .matching(format!(r"\.\s*{UNDERSCORE_IDENT_RE}"))
        .relevance(0)
}

/// A `#!` interpreter line. Only matches at the very start of the input, and only
/// for `binary` when one is given.
#[must_use]
pub fn shebang(binary: Option<&str>) -> ModeDef {
    let begin = match binary {
        Some(binary) => pattern::concat(&[r"^#![ ]*/", r".*\b", &pattern::escape(binary), r"\b.*"]),
        None => r"^#![ ]*/".to_string(),
    };
    ModeDef::new()
        .label("shebang")
        .scope("meta")
        .begin(begin)
        .end("$")
        .relevance(0)
        .guard(Guard::new(|ctx| ctx.start() == 0))
}

/// The mode list a grammar can use to contain every stock string and comment.
#[must_use]
pub fn strings_and_comments() -> Vec<ModeRef> {
    vec![
        apos_string().into(),
        quote_string().into(),
        c_line_comment().into(),
        c_block_comment().into(),
    ]
}

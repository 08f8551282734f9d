use scopelex::common::{c_line_comment, c_number, quote_string};
use scopelex::{highlight, Grammar, GrammarDef, KeywordTableDef, Registry, TokenizeOptions};

fn main() {
    let grammar = Grammar::load(GrammarDef {
        name: "toy".into(),
        keywords: Some(KeywordTableDef::keywords("let if else return")),
        contains: vec![quote_string().into(), c_line_comment().into(), c_number().into()],
        ..GrammarDef::default()
    });

    let mut registry = Registry::new();
    match grammar {
        Ok(grammar) => {
            registry.register(grammar);
        }
        Err(e) => {
            eprintln!("Failed to load grammar: {e:?}");
            return;
        }
    }

    let source = r#"let greeting = "hi"; // say it
if ready return 42"#;

    match highlight(source, "toy", &registry, TokenizeOptions::default()) {
        Ok(result) => {
            for span in result.spans(source) {
                println!("{:<24} {:?}", span.scopes.join("."), span.text);
            }
            let json_output = result.to_json().unwrap();
            println!("\nEvent stream as JSON:\n{json_output}");
        }
        Err(e) => {
            eprintln!("Failed to highlight: {e:?}");
        }
    }
}

//! Frontend pipeline benchmarks: lex, parse, elaborate + typecheck.

use ailang_runtime::elaborate::elaborate_module;
use ailang_runtime::lexer::Lexer;
use ailang_runtime::link::GlobalEnv;
use ailang_runtime::loader::LoadedModule;
use ailang_runtime::parser::parse_module;
use ailang_runtime::typecheck::typecheck_module;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;

const SOURCE: &str = r#"module bench/sample

type Shape = Dot | Line(int) | Rect(int, int)

func area(s: Shape) -> int {
  match s {
    Dot => 0,
    Line(_) => 0,
    Rect(w, h) => w * h,
  }
}

func total(shapes: [Shape]) -> int {
  match shapes {
    [] => 0,
    [s, ...rest] => area(s) + total(rest),
  }
}

export func main() -> int {
  total([Dot, Line(4), Rect(3, 5)])
}
"#;

fn loaded() -> LoadedModule {
    let (ast, diags) = parse_module(SOURCE);
    assert!(diags.is_empty());
    LoadedModule {
        path: ast.path.clone(),
        imports: Vec::new(),
        ast,
        source: SOURCE.to_string(),
        file: None,
    }
}

fn bench_lexer(c: &mut Criterion) {
    c.bench_function("lexer/sample_module", |b| {
        b.iter(|| Lexer::new(black_box(SOURCE)).tokenize())
    });
}

fn bench_parser(c: &mut Criterion) {
    c.bench_function("parser/sample_module", |b| {
        b.iter(|| parse_module(black_box(SOURCE)))
    });
}

fn bench_elaborate_and_typecheck(c: &mut Criterion) {
    let module = loaded();
    let env = GlobalEnv::default();
    let ifaces = HashMap::new();
    c.bench_function("frontend/elaborate_typecheck", |b| {
        b.iter(|| {
            let elaborated = elaborate_module(black_box(&module), &env, &ifaces).unwrap();
            typecheck_module(elaborated, &ifaces).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_lexer,
    bench_parser,
    bench_elaborate_and_typecheck
);
criterion_main!(benches);

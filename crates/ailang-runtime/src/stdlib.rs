//! Embedded standard library
//!
//! Small `.ail` modules compiled through the normal pipeline. Each wraps
//! `_`-prefixed builtin references, so effect rows on the wrappers are
//! checked against the builtin registry like any user code. On-disk
//! modules under the source root shadow nothing here; the loader tries
//! disk first, then this table.

/// `std/io`: console I/O
const STD_IO: &str = r#"module std/io

export func println(s: string) -> () ! {IO} {
  _io_println(s)
}

export func print(s: string) -> () ! {IO} {
  _io_print(s)
}

export func readLine() -> string ! {IO} {
  _io_read_line()
}
"#;

/// `std/fs`: file system access
const STD_FS: &str = r#"module std/fs

export func readFile(path: string) -> string ! {FS} {
  _fs_read_file(path)
}

export func writeFile(path: string, contents: string) -> () ! {FS} {
  _fs_write_file(path, contents)
}

export func fileExists(path: string) -> bool ! {FS} {
  _fs_exists(path)
}
"#;

/// `std/clock`: wall-clock and sleep
const STD_CLOCK: &str = r#"module std/clock

export func now() -> int ! {Clock} {
  _clock_now()
}

export func sleepMs(ms: int) -> () ! {Clock} {
  _clock_sleep(ms)
}
"#;

/// `std/net`: HTTP client
const STD_NET: &str = r#"module std/net

export func httpGet(url: string) -> string ! {Net} {
  _net_http_get(url)
}

export func httpPost(url: string, body: string) -> string ! {Net} {
  _net_http_post(url, body)
}
"#;

/// `std/env`: process environment
const STD_ENV: &str = r#"module std/env

export func getEnv(name: string) -> string ! {Env} {
  _env_get(name)
}
"#;

/// `std/option`: the Option ADT
const STD_OPTION: &str = r#"module std/option

export type Option(a) = None | Some(a)

export func withDefault(fallback: a, opt: Option(a)) -> a {
  match opt {
    Some(x) => x,
    None => fallback,
  }
}
"#;

/// `std/result`: the Result ADT
const STD_RESULT: &str = r#"module std/result

export type Result(a, e) = Ok(a) | Err(e)

export func isOk(r: Result(a, e)) -> bool {
  match r {
    Ok(_) => true,
    Err(_) => false,
  }
}
"#;

/// `std/list`: list helpers
const STD_LIST: &str = r#"module std/list

import std/option (Option, Some, None)

export func length(xs: [a]) -> int {
  match xs {
    [] => 0,
    [_, ...rest] => 1 + length(rest),
  }
}

export func head(xs: [a]) -> Option(a) {
  match xs {
    [] => None,
    [x, ...] => Some(x),
  }
}

export func append(xs: [a], ys: [a]) -> [a] {
  match xs {
    [] => ys,
    [x, ...rest] => _list_cons(x, append(rest, ys)),
  }
}
"#;

/// `std/string`: string helpers and rendering
const STD_STRING: &str = r#"module std/string

export func length(s: string) -> int {
  _str_len(s)
}

export func showInt(n: int) -> string {
  _show_int(n)
}

export func showFloat(x: float) -> string {
  _show_float(x)
}

export func showBool(b: bool) -> string {
  _show_bool(b)
}
"#;

const MODULES: &[(&str, &str)] = &[
    ("std/clock", STD_CLOCK),
    ("std/env", STD_ENV),
    ("std/fs", STD_FS),
    ("std/io", STD_IO),
    ("std/list", STD_LIST),
    ("std/net", STD_NET),
    ("std/option", STD_OPTION),
    ("std/result", STD_RESULT),
    ("std/string", STD_STRING),
];

/// Look up an embedded module's source
pub fn source(module: &str) -> Option<&'static str> {
    MODULES
        .iter()
        .find(|(name, _)| *name == module)
        .map(|(_, source)| *source)
}

/// All embedded module names, sorted
pub fn module_names() -> Vec<&'static str> {
    MODULES.iter().map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[test]
    fn test_all_embedded_modules_parse() {
        for (name, source) in MODULES {
            let (module, diags) = parse_module(source);
            assert!(
                diags.is_empty(),
                "stdlib module {} has parse diagnostics: {:#?}",
                name,
                diags
            );
            assert_eq!(module.path, *name);
        }
    }

    #[test]
    fn test_module_names_sorted() {
        let names = module_names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}

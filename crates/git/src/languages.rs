//! File name to language classification.

use std::collections::HashMap;
use std::path::Path;

/// Language for a file path, by exact file name first and extension second.
pub fn language_for(path: &str) -> Option<&'static str> {
    let path = Path::new(path);
    let name = path.file_name()?.to_str()?;
    by_file_name(name).or_else(|| {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        by_extension(&ext)
    })
}

fn by_file_name(name: &str) -> Option<&'static str> {
    let lang = match name {
        "Makefile" | "GNUmakefile" | "makefile" => "Makefile",
        "Dockerfile" | "Containerfile" => "Dockerfile",
        "CMakeLists.txt" => "CMake",
        "Rakefile" | "Gemfile" | "Podfile" => "Ruby",
        "BUILD" | "BUILD.bazel" | "WORKSPACE" => "Starlark",
        "meson.build" => "Meson",
        "Jenkinsfile" => "Groovy",
        "configure.ac" => "M4",
        _ => return None,
    };
    Some(lang)
}

fn by_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext {
        "rs" => "Rust",
        "go" => "Go",
        "c" | "h" => "C",
        "cc" | "cpp" | "cxx" | "c++" | "hpp" | "hh" | "hxx" | "ipp" => "C++",
        "m" | "mm" => "Objective-C",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "scala" | "sc" => "Scala",
        "groovy" | "gradle" => "Groovy",
        "clj" | "cljs" | "cljc" | "edn" => "Clojure",
        "cs" => "C#",
        "fs" | "fsx" | "fsi" => "F#",
        "vb" => "Visual Basic",
        "swift" => "Swift",
        "py" | "pyi" | "pyx" => "Python",
        "rb" | "gemspec" => "Ruby",
        "php" => "PHP",
        "pl" | "pm" => "Perl",
        "lua" => "Lua",
        "r" => "R",
        "jl" => "Julia",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "mts" | "cts" | "tsx" => "TypeScript",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "dart" => "Dart",
        "html" | "htm" => "HTML",
        "css" => "CSS",
        "scss" | "sass" => "SCSS",
        "less" => "Less",
        "sh" | "bash" | "zsh" | "ksh" => "Shell",
        "fish" => "Fish",
        "ps1" | "psm1" => "PowerShell",
        "bat" | "cmd" => "Batchfile",
        "hs" | "lhs" => "Haskell",
        "ml" | "mli" => "OCaml",
        "ex" | "exs" => "Elixir",
        "erl" | "hrl" => "Erlang",
        "elm" => "Elm",
        "zig" => "Zig",
        "nim" => "Nim",
        "d" => "D",
        "v" | "sv" | "svh" => "Verilog",
        "vhd" | "vhdl" => "VHDL",
        "f" | "f77" | "f90" | "f95" | "f03" | "for" => "Fortran",
        "asm" | "s" => "Assembly",
        "sql" => "SQL",
        "proto" => "Protocol Buffer",
        "thrift" => "Thrift",
        "tf" | "hcl" => "HCL",
        "nix" => "Nix",
        "cmake" => "CMake",
        "mk" => "Makefile",
        "tex" | "sty" | "cls" => "TeX",
        "el" => "Emacs Lisp",
        "lisp" | "lsp" | "cl" => "Common Lisp",
        "scm" | "ss" => "Scheme",
        "rkt" => "Racket",
        "vim" => "Vim Script",
        "cu" | "cuh" => "Cuda",
        "sol" => "Solidity",
        "pas" | "pp" => "Pascal",
        "ada" | "adb" | "ads" => "Ada",
        "cob" | "cbl" => "COBOL",
        "tcl" => "Tcl",
        "awk" => "Awk",
        "coffee" => "CoffeeScript",
        "cr" => "Crystal",
        "hx" => "Haxe",
        "purs" => "PureScript",
        "re" | "rei" => "Reason",
        "vala" => "Vala",
        "wat" | "wast" => "WebAssembly",
        _ => return None,
    };
    Some(lang)
}

/// Accumulate bytes per language and return the `top_n` largest, biggest
/// first. Ties are broken by name for a stable order.
pub fn rank_languages<'a, I>(files: I, top_n: usize) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let mut bytes: HashMap<&'static str, u64> = HashMap::new();
    for (path, size) in files {
        if let Some(lang) = language_for(path) {
            *bytes.entry(lang).or_default() += size;
        }
    }
    let mut ranked: Vec<(&'static str, u64)> = bytes.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(top_n).map(|(lang, _)| lang.to_string()).collect()
}

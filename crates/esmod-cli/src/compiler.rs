//! The oxc-backed compiler: transforms one module at a time.
//!
//! Import specifiers are deliberately left untouched: with no bundling
//! step, every import stays an independently servable path, which is what
//! makes the cache per-module rather than per-bundle. CSS, HTML, and
//! anything else non-module is cached as-is; the serving layer decides how
//! to wrap it.

use std::path::Path;

use async_trait::async_trait;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use rust_embed::RustEmbed;

use esmod_engine::{BuildOptions, Compiler, CompilerReturn, SourceId};

/// Extensions treated as transformable module sources.
pub const MODULE_EXTENSIONS: &[&str] = &["ts", "mjs", "js", "tsx", "jsx"];

/// Browser-side helper modules compiled into the binary, served under
/// `/builtin:<name>`.
#[derive(RustEmbed)]
#[folder = "assets/builtin/"]
struct Builtins;

/// True when `path` has one of the [`MODULE_EXTENSIONS`].
pub fn is_module_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext))
}

/// The real [`Compiler`]: oxc parse, TS/JSX transform, codegen, and
/// optional minification.
#[derive(Debug, Default)]
pub struct OxcCompiler;

#[async_trait]
impl Compiler for OxcCompiler {
    async fn compile(&self, source: &SourceId, options: &BuildOptions) -> CompilerReturn {
        match source {
            SourceId::Virtual(name) => {
                let Some(file) = Builtins::get(name) else {
                    return CompilerReturn::failure(vec![format!("unknown builtin module: {name}")]);
                };
                let code = String::from_utf8_lossy(&file.data);
                transform_module(Path::new(name.as_str()), &code, options)
            }
            SourceId::Path(path) => {
                if is_module_path(path) {
                    let code = match tokio::fs::read_to_string(path).await {
                        Ok(code) => code,
                        Err(err) => {
                            // The engine statted this path moments ago; a
                            // read failure here is a race with an editor and
                            // reported as an ordinary build failure.
                            return CompilerReturn::failure(vec![format!(
                                "failed to read {}: {err}",
                                path.display()
                            )]);
                        }
                    };
                    transform_module(path, &code, options)
                } else {
                    match tokio::fs::read(path).await {
                        Ok(bytes) => CompilerReturn::output(bytes),
                        Err(err) => CompilerReturn::failure(vec![format!(
                            "failed to read {}: {err}",
                            path.display()
                        )]),
                    }
                }
            }
        }
    }
}

/// Parse, strip TS/JSX, and generate (optionally minified) ESM output.
fn transform_module(path: &Path, code: &str, options: &BuildOptions) -> CompilerReturn {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

    let parsed = Parser::new(&allocator, code, source_type).parse();
    if !parsed.errors.is_empty() {
        return CompilerReturn::failure(
            parsed
                .errors
                .iter()
                .map(|err| format!("{}: {err}", path.display()))
                .collect(),
        );
    }
    let mut program = parsed.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let transform_options = TransformOptions::from_target("es2020").unwrap_or_default();
    let transformed = Transformer::new(&allocator, path, &transform_options)
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return CompilerReturn::failure(
            transformed
                .errors
                .iter()
                .map(|err| format!("{}: {err}", path.display()))
                .collect(),
        );
    }

    let scoping = if options.minify {
        Minifier::new(MinifierOptions::default())
            .minify(&allocator, &mut program)
            .scoping
    } else {
        None
    };

    let output = Codegen::new()
        .with_options(CodegenOptions {
            minify: options.minify,
            ..CodegenOptions::default()
        })
        .with_scoping(scoping)
        .build(&program);

    CompilerReturn::output(output.code.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dev_options() -> BuildOptions {
        BuildOptions::default()
    }

    fn minified_options() -> BuildOptions {
        BuildOptions {
            minify: true,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn test_module_extension_detection() {
        assert!(is_module_path(Path::new("/srv/app.ts")));
        assert!(is_module_path(Path::new("/srv/app.tsx")));
        assert!(is_module_path(Path::new("/srv/util.mjs")));
        assert!(!is_module_path(Path::new("/srv/style.css")));
        assert!(!is_module_path(Path::new("/srv/index.html")));
        assert!(!is_module_path(Path::new("/srv/Makefile")));
    }

    #[test]
    fn test_typescript_types_are_stripped() {
        let out = transform_module(
            Path::new("app.ts"),
            "export const answer: number = 42",
            &dev_options(),
        );
        assert!(out.diagnostics.is_empty());
        let code = String::from_utf8(out.output_files[0].contents.clone()).unwrap();
        assert!(code.contains("answer"));
        assert!(!code.contains(": number"));
    }

    #[test]
    fn test_imports_stay_external() {
        let out = transform_module(
            Path::new("app.ts"),
            "import { greet } from \"./greet.ts\"\ngreet()",
            &dev_options(),
        );
        assert!(out.diagnostics.is_empty());
        let code = String::from_utf8(out.output_files[0].contents.clone()).unwrap();
        assert!(code.contains("./greet.ts"));
    }

    #[test]
    fn test_syntax_error_becomes_diagnostics() {
        let out = transform_module(Path::new("bad.ts"), "const = ;", &dev_options());
        assert!(out.output_files.is_empty());
        assert!(!out.diagnostics.is_empty());
        assert!(out.diagnostics[0].contains("bad.ts"));
    }

    #[test]
    fn test_minification_shrinks_output() {
        let source = r#"
// a comment the minifier drops
export function greetTheWholeWorld() {
    const longVariableName = "hello"
    const anotherLongName = "world"
    return longVariableName + " " + anotherLongName
}
"#;
        let plain = transform_module(Path::new("app.ts"), source, &dev_options());
        let small = transform_module(Path::new("app.ts"), source, &minified_options());
        assert!(plain.diagnostics.is_empty());
        assert!(small.diagnostics.is_empty());
        assert!(
            small.output_files[0].contents.len() < plain.output_files[0].contents.len(),
            "minified output is not smaller"
        );
    }

    #[tokio::test]
    async fn test_builtin_css_module_compiles() {
        let compiler = OxcCompiler;
        let out = compiler
            .compile(&SourceId::Virtual("css.ts".to_string()), &dev_options())
            .await;
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let code = String::from_utf8(out.output_files[0].contents.clone()).unwrap();
        assert!(code.contains("applyCSS"));
    }

    #[tokio::test]
    async fn test_unknown_builtin_fails() {
        let compiler = OxcCompiler;
        let out = compiler
            .compile(&SourceId::Virtual("nope.ts".to_string()), &dev_options())
            .await;
        assert!(out.output_files.is_empty());
        assert!(!out.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_css_is_passed_through_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let css_path = dir.path().join("style.css");
        std::fs::write(&css_path, "body { color: red }").unwrap();

        let compiler = OxcCompiler;
        let out = compiler
            .compile(&SourceId::Path(css_path), &minified_options())
            .await;
        assert!(out.diagnostics.is_empty());
        assert_eq!(&out.output_files[0].contents, b"body { color: red }");
    }

    #[tokio::test]
    async fn test_missing_file_is_a_diagnostic() {
        let compiler = OxcCompiler;
        let out = compiler
            .compile(
                &SourceId::Path(PathBuf::from("/definitely/not/here.ts")),
                &dev_options(),
            )
            .await;
        assert!(out.output_files.is_empty());
        assert!(!out.diagnostics.is_empty());
    }
}

use std::{collections::BTreeSet, ops::Range};

use hashbrown::HashSet;

use crate::{
    DeclaredDependency, DependencyKind, ExportedBinding, Exports, ImportedNames,
    ModuleId, ReExport, ReExportNames, Transform, TransformArgs, TransformOutput,
};

/// Line-oriented scanner for ES module syntax.
///
/// Only directives that start at column zero are recognized, apart from
/// `import("...")` which is picked up anywhere. The code itself is passed
/// through unchanged.
#[derive(Debug, Default, Clone)]
pub struct ScanTransform;

impl ScanTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for ScanTransform {
    fn name(&self) -> &str {
        "scan"
    }

    fn identity(&self) -> String {
        "scan@1".to_string()
    }

    fn matches(&self, id: &ModuleId, _source: &str) -> bool {
        let id = id.as_str();
        id.ends_with(".js") || id.ends_with(".mjs")
    }

    fn transform(&self, args: TransformArgs<'_>) -> anyhow::Result<TransformOutput> {
        let scanned = scan(&args.code);
        let mut dependencies = args.dependencies;
        dependencies.extend(scanned.dependencies);

        let exports = match args.exports {
            Exports::Static(mut set) if !scanned.dynamic_exports => {
                set.bindings.extend(scanned.bindings);
                set.re_exports.extend(scanned.re_exports);
                set.used_locally.extend(scanned.used_locally);
                Exports::Static(set)
            }
            _ => Exports::Dynamic,
        };

        Ok(TransformOutput {
            code: args.code,
            dependencies,
            exports,
        })
    }
}

#[derive(Debug, Default)]
struct Scanned {
    dependencies: Vec<DeclaredDependency>,
    bindings: Vec<ExportedBinding>,
    re_exports: Vec<ReExport>,
    used_locally: Vec<String>,
    dynamic_exports: bool,
}

struct Line<'a> {
    start: usize,
    text: &'a str,
}

impl Line<'_> {
    fn is_top_level(&self) -> bool {
        let text = self.text.trim_end();
        !text.is_empty()
            && !text.starts_with(char::is_whitespace)
            && !text.starts_with(['}', ')', ']'])
    }
}

fn scan(code: &str) -> Scanned {
    let mut scanned = Scanned::default();

    let mut lines = vec![];
    let mut offset = 0;
    for text in code.split_inclusive('\n') {
        lines.push(Line {
            start: offset,
            text,
        });
        offset += text.len();
    }

    for (index, line) in lines.iter().enumerate() {
        if let Some(rest) = keyword(line.text, "import") {
            scan_import(&code[line.start + line.text.len() - rest.len()..], &mut scanned);
        } else if let Some(rest) = keyword(line.text, "export") {
            let span_end = lines[index + 1..]
                .iter()
                .find(|line| line.is_top_level())
                .map_or(code.len(), |line| line.start);
            let rest_start = line.start + line.text.len() - rest.len();
            scan_export(code, rest_start, line.start..span_end, &mut scanned);
        }
    }

    link_references(code, &mut scanned);
    scan_dynamic_imports(code, &mut scanned);
    if code.contains("module.exports") {
        scanned.dynamic_exports = true;
    }
    scanned
}

/// The text after `word` when `line` starts with it as a whole word.
fn keyword<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(word)?;
    match rest.chars().next() {
        Some(c) if is_ident_char(c) || c == '.' || c == '(' => None,
        _ => Some(rest),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn ident(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|(_, c)| !is_ident_char(*c))
        .map_or(text.len(), |(index, _)| index);
    (end > 0).then(|| (&text[..end], &text[end..]))
}

/// Reads a quoted string literal at the start of `text`.
fn string_literal(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    let quote = text.chars().next().filter(|c| matches!(c, '"' | '\'' | '`'))?;
    let body = &text[1..];
    let end = body.find(quote)?;
    Some((&body[..end], &body[end + 1..]))
}

fn from_clause(text: &str) -> Option<&str> {
    let rest = keyword(text.trim_start(), "from")?;
    string_literal(rest).map(|(specifier, _)| specifier)
}

fn scan_import(rest: &str, scanned: &mut Scanned) {
    if rest.trim_start().starts_with('(') {
        return;
    }
    if let Some((specifier, _)) = string_literal(rest) {
        scanned.dependencies.push(DeclaredDependency::new(
            specifier,
            DependencyKind::Static,
            ImportedNames::SideEffect,
        ));
        return;
    }
    let Some(quote) = rest.find(['"', '\'']) else {
        return;
    };
    let Some((specifier, _)) = string_literal(&rest[quote..]) else {
        return;
    };
    let clause = rest[..quote].trim_end();
    let Some(clause) = clause.strip_suffix("from") else {
        return;
    };
    let imported = if clause.contains('*') {
        ImportedNames::Namespace
    } else {
        ImportedNames::Named(imported_names(clause))
    };
    scanned.dependencies.push(DeclaredDependency::new(
        specifier,
        DependencyKind::Static,
        imported,
    ));
}

/// `d`, `{ a, b as c }` or `d, { a }`.
fn imported_names(clause: &str) -> Vec<String> {
    let mut names = vec![];
    let (default, braced) = match clause.find('{') {
        Some(open) => (&clause[..open], Some(&clause[open + 1..])),
        None => (clause, None),
    };
    if !default.trim().trim_end_matches(',').trim().is_empty() {
        names.push("default".to_string());
    }
    if let Some(braced) = braced {
        let braced = braced.split('}').next().unwrap_or_default();
        for item in braced.split(',') {
            if let Some((name, _)) = ident(item) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn scan_export(code: &str, rest_start: usize, span: Range<usize>, scanned: &mut Scanned) {
    let rest = &code[rest_start..];
    let trimmed = rest.trim_start();

    if let Some(star) = trimmed.strip_prefix('*') {
        let (names, after) = match keyword(star.trim_start(), "as").and_then(ident) {
            Some((alias, after)) => (
                ReExportNames::Named(vec![("*".to_string(), alias.to_string())]),
                after,
            ),
            None => (ReExportNames::All, star),
        };
        if let Some(specifier) = from_clause(after) {
            scanned.re_exports.push(ReExport {
                specifier: specifier.to_string(),
                names,
            });
        }
        return;
    }

    if let Some(braced) = trimmed.strip_prefix('{') {
        let Some(close) = braced.find('}') else {
            return;
        };
        let pairs = braced[..close]
            .split(',')
            .filter_map(|item| {
                let (local, after) = ident(item)?;
                let exported = keyword(after.trim_start(), "as")
                    .and_then(ident)
                    .map_or(local, |(alias, _)| alias);
                Some((local.to_string(), exported.to_string()))
            })
            .collect::<Vec<_>>();
        let after = braced[close + 1..].lines().next().unwrap_or_default();
        match from_clause(after) {
            Some(specifier) => scanned.re_exports.push(ReExport {
                specifier: specifier.to_string(),
                names: ReExportNames::Named(pairs),
            }),
            None => scanned.bindings.extend(pairs.into_iter().map(|(local, exported)| {
                ExportedBinding::new(exported, None).with_references([local])
            })),
        }
        return;
    }

    if keyword(trimmed, "default").is_some() {
        scanned.bindings.push(ExportedBinding::new("default", Some(span)));
        return;
    }

    if let Some(name) = declared_name(trimmed) {
        scanned.bindings.push(ExportedBinding::new(name, Some(span)));
    }
}

/// Name introduced by `const`, `let`, `var`, `function`, `class` or
/// `async function` declarations.
fn declared_name(text: &str) -> Option<&str> {
    let text = keyword(text, "async").map_or(text, str::trim_start);
    for declarator in ["const", "let", "var", "class"] {
        if let Some(rest) = keyword(text, declarator) {
            return ident(rest).map(|(name, _)| name);
        }
    }
    let rest = keyword(text, "function")?;
    let rest = rest.trim_start().trim_start_matches('*');
    ident(rest).map(|(name, _)| name)
}

/// Which exported names each definition refers to, and which ones the code
/// outside every definition refers to. Over-approximates: any matching word
/// counts, including property names and string contents.
fn link_references(code: &str, scanned: &mut Scanned) {
    let exported = scanned
        .bindings
        .iter()
        .map(|binding| binding.name.clone())
        .filter(|name| name != "default")
        .collect::<HashSet<_>>();

    for binding in &mut scanned.bindings {
        let referenced = match &binding.span {
            Some(span) => words(&code[span.clone()]).map(str::to_string).collect(),
            None => binding.references.drain(..).collect::<BTreeSet<_>>(),
        };
        binding.references = referenced
            .into_iter()
            .filter(|name| *name != binding.name && exported.contains(name))
            .collect();
    }

    let mut spans = scanned
        .bindings
        .iter()
        .filter_map(|binding| binding.span.clone())
        .collect::<Vec<_>>();
    spans.sort_by_key(|span| span.start);
    let mut outside = vec![];
    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            outside.push(&code[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    outside.push(&code[cursor..]);

    // Export lists only name bindings, they do not use them.
    scanned.used_locally = outside
        .into_iter()
        .flat_map(str::lines)
        .filter(|line| keyword(line, "export").is_none())
        .flat_map(words)
        .filter(|word| exported.contains(*word))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_ident_char(c))
        .filter(|word| !word.is_empty())
}

fn scan_dynamic_imports(code: &str, scanned: &mut Scanned) {
    for (index, _) in code.match_indices("import") {
        let preceded_by_ident = code[..index]
            .chars()
            .next_back()
            .map_or(false, |c| is_ident_char(c) || c == '.');
        if preceded_by_ident {
            continue;
        }
        let Some(call) = code[index + "import".len()..].trim_start().strip_prefix('(') else {
            continue;
        };
        if let Some((specifier, _)) = string_literal(call) {
            scanned
                .dependencies
                .push(DeclaredDependency::dynamic(specifier));
        }
    }
}

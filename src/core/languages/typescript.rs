use regex::{Captures, Regex};

use crate::error::Result;
use crate::core::trace::{ExportEntry, ExportKind, ImportEntry};
use super::{FileAnalysis, SourceAnalyzer};

/// Upper bound on physical lines folded into one logical statement
const MAX_STATEMENT_LINES: usize = 64;

const IDENT: &str = r"[A-Za-z_$][\w$]*";

/// Lexical export/import extractor for TypeScript and JavaScript sources
pub struct TypeScriptAnalyzer {
    comment_or_literal: Regex,
    statement_start: Regex,
    from_clause: Regex,
    require_call: Regex,

    reexport_all: Regex,
    reexport_named: Regex,
    export_assign: Regex,
    export_default: Regex,
    export_declaration: Regex,
    default_function: Regex,
    default_class: Regex,
    default_identifier: Regex,
    decl_function: Regex,
    decl_class: Regex,
    decl_interface: Regex,
    decl_enum: Regex,
    decl_type: Regex,
    decl_binding: Regex,
    decl_import_alias: Regex,
    declarator: Regex,

    import_side_effect: Regex,
    import_from: Regex,
    import_equals: Regex,
    require_assign: Regex,
    require_bare: Regex,
    namespace_clause: Regex,
}

impl TypeScriptAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Literals are matched so comment markers inside them are skipped.
            comment_or_literal: Regex::new(
                r#"(?s)'(?:[^'\\\n]|\\.)*'|"(?:[^"\\\n]|\\.)*"|`(?:[^`\\]|\\.)*`|//[^\n]*|/\*.*?\*/"#,
            )?,
            // `import(` and `import.meta` are expressions, not statements.
            statement_start: Regex::new(r#"^(?:import[\s{*'"]|export\s+(?:type\s+)?[{*])"#)?,
            from_clause: Regex::new(r#"\bfrom\s*['"][^'"]*['"]"#)?,
            require_call: Regex::new(r#"\brequire\(\s*['"][^'"]*['"]\s*\)"#)?,

            reexport_all: Regex::new(&format!(
                r#"^export\s+(?:type\s+)?\*\s*(?:as\s+({IDENT})\s*)?from\s*['"]([^'"]+)['"]"#
            ))?,
            reexport_named: Regex::new(r"^export\s+(?:type\s+)?\{([^}]*)\}")?,
            export_assign: Regex::new(&format!(r"^export\s*=\s*({IDENT})"))?,
            export_default: Regex::new(r"^export\s+default\s+(.*)$")?,
            export_declaration: Regex::new(r"^export\s+(?:declare\s+)?(.*)$")?,
            default_function: Regex::new(&format!(
                r"^(?:async\s+)?function\b\s*\*?\s*({IDENT})?"
            ))?,
            default_class: Regex::new(&format!(r"^(?:abstract\s+)?class\b\s*({IDENT})?"))?,
            default_identifier: Regex::new(&format!(r"^({IDENT})\s*;?\s*$"))?,
            decl_function: Regex::new(&format!(r"^(?:async\s+)?function\b\s*\*?\s*({IDENT})"))?,
            decl_class: Regex::new(&format!(r"^(?:abstract\s+)?class\s+({IDENT})"))?,
            decl_interface: Regex::new(&format!(r"^interface\s+({IDENT})"))?,
            decl_enum: Regex::new(&format!(r"^(?:const\s+)?enum\s+({IDENT})"))?,
            decl_type: Regex::new(&format!(r"^type\s+({IDENT})"))?,
            decl_binding: Regex::new(r"^(?:const|let|var)\s+(.+)$")?,
            decl_import_alias: Regex::new(&format!(r"^import\s+({IDENT})\s*="))?,
            declarator: Regex::new(&format!(r"^\s*({IDENT})\s*(?:[:=;!]|$)"))?,

            import_side_effect: Regex::new(r#"^import\s*['"]([^'"]+)['"]"#)?,
            import_from: Regex::new(
                r#"^import\s+(?:type\s+)?(.+?)\s*from\s*['"]([^'"]+)['"]"#,
            )?,
            import_equals: Regex::new(&format!(
                r#"^import\s+({IDENT})\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#
            ))?,
            require_assign: Regex::new(
                r#"^(?:const|let|var)\s+(.+?)\s*=\s*(?:await\s+)?require\(\s*['"]([^'"]+)['"]\s*\)"#,
            )?,
            require_bare: Regex::new(r#"^require\(\s*['"]([^'"]+)['"]\s*\)"#)?,
            namespace_clause: Regex::new(&format!(r"^\*\s*as\s+({IDENT})"))?,
        })
    }

    /// Fold the source into logical statements: comments removed, multi-line
    /// import/export lists joined onto one line.
    fn logical_statements(&self, source: &str) -> Vec<String> {
        // Keep line structure so code after a comment stays on its own line.
        let stripped = self.comment_or_literal.replace_all(source, |caps: &Captures| {
            let found = &caps[0];
            if found.starts_with('/') {
                "\n".repeat(found.matches('\n').count())
            } else {
                found.to_string()
            }
        });

        let lines: Vec<&str> = stripped
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let mut statements = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let mut buffer = lines[i].to_string();
            let mut next = i + 1;

            if self.statement_start.is_match(&buffer) {
                while next < lines.len()
                    && next - i < MAX_STATEMENT_LINES
                    && !self.is_complete(&buffer, lines[next])
                {
                    buffer.push(' ');
                    buffer.push_str(lines[next]);
                    next += 1;
                }
            }

            statements.push(buffer);
            i = next;
        }

        statements
    }

    fn is_complete(&self, buffer: &str, next_line: &str) -> bool {
        if buffer.contains(';')
            || self.from_clause.is_match(buffer)
            || self.import_side_effect.is_match(buffer)
            || self.require_call.is_match(buffer)
        {
            return true;
        }

        // `export { a, b }` without a terminator: done once the braces close,
        // unless the source clause continues on the next line.
        let opens = buffer.matches('{').count();
        let closes = buffer.matches('}').count();
        buffer.starts_with("export")
            && closes > 0
            && opens == closes
            && !next_line.starts_with("from")
    }

    fn extract_export(&self, statement: &str, exports: &mut Vec<ExportEntry>) {
        if !statement.starts_with("export") {
            return;
        }

        if let Some(caps) = self.reexport_all.captures(statement) {
            let symbol = caps.get(1).map_or("*", |m| m.as_str());
            push_export(exports, symbol, ExportKind::Reexport);
            return;
        }

        if let Some(caps) = self.reexport_named.captures(statement) {
            for item in split_list(&caps[1]) {
                if let Some(name) = visible_name(&item) {
                    push_export(exports, &name, ExportKind::Reexport);
                }
            }
            return;
        }

        if let Some(caps) = self.export_assign.captures(statement) {
            push_export(exports, &caps[1], ExportKind::Default);
            return;
        }

        if let Some(caps) = self.export_default.captures(statement) {
            let rest = caps[1].trim();
            let name = self
                .default_function
                .captures(rest)
                .or_else(|| self.default_class.captures(rest))
                .map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .or_else(|| {
                    self.default_identifier
                        .captures(rest)
                        .map(|c| Some(c[1].to_string()))
                })
                .flatten()
                .filter(|name| name != "extends" && name != "implements");
            push_export(exports, name.as_deref().unwrap_or("default"), ExportKind::Default);
            return;
        }

        let Some(caps) = self.export_declaration.captures(statement) else {
            return;
        };
        let rest = caps[1].trim();

        let declarations = [
            (&self.decl_function, ExportKind::Function),
            (&self.decl_class, ExportKind::Class),
            (&self.decl_interface, ExportKind::Interface),
            (&self.decl_enum, ExportKind::Enum),
            (&self.decl_type, ExportKind::Type),
            (&self.decl_import_alias, ExportKind::Const),
        ];
        for (pattern, kind) in declarations {
            if let Some(caps) = pattern.captures(rest) {
                push_export(exports, &caps[1], kind);
                return;
            }
        }

        if let Some(caps) = self.decl_binding.captures(rest) {
            for name in self.binding_names(&caps[1]) {
                push_export(exports, &name, ExportKind::Const);
            }
        }
    }

    /// Names introduced by a `const`/`let`/`var` declaration list
    fn binding_names(&self, declaration: &str) -> Vec<String> {
        let declaration = declaration.trim();
        if declaration.starts_with('{') || declaration.starts_with('[') {
            return destructured_names(declaration);
        }

        split_top_level(declaration)
            .iter()
            .filter_map(|declarator| {
                self.declarator
                    .captures(declarator)
                    .map(|caps| caps[1].to_string())
            })
            .collect()
    }

    fn extract_import(&self, statement: &str, imports: &mut Vec<ImportEntry>) {
        if let Some(caps) = self.import_side_effect.captures(statement) {
            imports.push(ImportEntry {
                source: caps[1].to_string(),
                symbols: Vec::new(),
            });
            return;
        }

        if let Some(caps) = self.import_equals.captures(statement) {
            imports.push(ImportEntry {
                source: caps[2].to_string(),
                symbols: vec![default_symbol(&caps[1])],
            });
            return;
        }

        if let Some(caps) = self.import_from.captures(statement) {
            imports.push(ImportEntry {
                source: caps[2].to_string(),
                symbols: self.import_clause_symbols(&caps[1]),
            });
            return;
        }

        // CommonJS, including `export const x = require('y')`.
        let body = statement
            .strip_prefix("export ")
            .map(str::trim_start)
            .unwrap_or(statement);

        if let Some(caps) = self.require_assign.captures(body) {
            let binding = caps[1].trim();
            let symbols = if binding.starts_with('{') || binding.starts_with('[') {
                destructured_names(binding)
            } else {
                binding
                    .split(':')
                    .next()
                    .map(|name| vec![default_symbol(name.trim())])
                    .unwrap_or_default()
            };
            imports.push(ImportEntry {
                source: caps[2].to_string(),
                symbols,
            });
            return;
        }

        if let Some(caps) = self.require_bare.captures(body) {
            imports.push(ImportEntry {
                source: caps[1].to_string(),
                symbols: Vec::new(),
            });
        }
    }

    /// Symbols named by the clause between `import` and `from`
    fn import_clause_symbols(&self, clause: &str) -> Vec<String> {
        let mut symbols = Vec::new();
        let mut rest = clause.trim();

        if !rest.starts_with('{') && !rest.starts_with('*') {
            let (default, remainder) = match rest.split_once(',') {
                Some((default, remainder)) => (default.trim(), remainder.trim()),
                None => (rest, ""),
            };
            if !default.is_empty() {
                symbols.push(default_symbol(default));
            }
            rest = remainder;
        }

        if let Some(caps) = self.namespace_clause.captures(rest) {
            symbols.push(format!("* as {}", &caps[1]));
        } else if let Some(inner) = rest
            .strip_prefix('{')
            .and_then(|r| r.rfind('}').map(|end| &r[..end]))
        {
            for item in split_list(inner) {
                let item = strip_type_modifier(&item);
                match item.split_once(" as ") {
                    Some((original, local)) if original.trim() == "default" => {
                        symbols.push(default_symbol(local.trim()))
                    }
                    Some((_, local)) => symbols.push(local.trim().to_string()),
                    None => symbols.push(item.to_string()),
                }
            }
        }

        symbols
    }
}

impl SourceAnalyzer for TypeScriptAnalyzer {
    fn analyze(&self, source: &str) -> FileAnalysis {
        let mut analysis = FileAnalysis::default();

        for statement in self.logical_statements(source) {
            self.extract_export(&statement, &mut analysis.exports);
            self.extract_import(&statement, &mut analysis.imports);
        }

        analysis
    }

    fn file_extensions(&self) -> &[&str] {
        &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"]
    }

    fn language_name(&self) -> &str {
        "typescript"
    }
}

fn default_symbol(name: &str) -> String {
    format!("{} (default)", name)
}

fn push_export(exports: &mut Vec<ExportEntry>, symbol: &str, kind: ExportKind) {
    // Overloads and declaration merging repeat the same export.
    if exports.iter().any(|e| e.symbol == symbol && e.kind == kind) {
        return;
    }
    exports.push(ExportEntry {
        symbol: symbol.to_string(),
        kind,
    });
}

/// Comma-separated items of a brace list, trimmed, empties dropped
fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn strip_type_modifier(item: &str) -> &str {
    item.strip_prefix("type ").map(str::trim).unwrap_or(item)
}

/// Externally visible name of an `a`, `a as b` or `type a` list item
fn visible_name(item: &str) -> Option<String> {
    let item = strip_type_modifier(item);
    let name = match item.split_once(" as ") {
        Some((_, alias)) => alias.trim(),
        None => item.trim(),
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Local names bound by an object or array destructuring pattern
fn destructured_names(pattern: &str) -> Vec<String> {
    let open = pattern.chars().next().unwrap_or('{');
    let close = if open == '[' { ']' } else { '}' };
    let inner = pattern
        .get(1..)
        .and_then(|rest| rest.find(close).map(|end| &rest[..end]))
        .unwrap_or("");

    split_list(inner)
        .into_iter()
        .filter_map(|item| {
            let item = item.trim_start_matches("...");
            let without_default = item.split('=').next().unwrap_or(item);
            let local = match without_default.split_once(':') {
                Some((_, local)) => local,
                None => without_default,
            };
            let local = local.trim();
            (!local.is_empty()).then(|| local.to_string())
        })
        .collect()
}

/// Split on commas that are not nested inside brackets or string literals
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(&text[start..idx]);
                    start = idx + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(source: &str) -> FileAnalysis {
        TypeScriptAnalyzer::new().unwrap().analyze(source)
    }

    fn exported(analysis: &FileAnalysis) -> Vec<(String, ExportKind)> {
        analysis
            .exports
            .iter()
            .map(|e| (e.symbol.clone(), e.kind))
            .collect()
    }

    #[test]
    fn recognizes_declaration_exports() {
        let analysis = analyze(
            r#"
export function parse(input: string) {}
export async function load() {}
export abstract class Base {}
export interface Options { a: number }
export type Id = string;
export const enum Mode { A, B }
export enum Color { Red }
export const limit = 10, other = 2;
export let counter = 0;
export declare function shim(): void;
"#,
        );
        assert_eq!(
            exported(&analysis),
            vec![
                ("parse".to_string(), ExportKind::Function),
                ("load".to_string(), ExportKind::Function),
                ("Base".to_string(), ExportKind::Class),
                ("Options".to_string(), ExportKind::Interface),
                ("Id".to_string(), ExportKind::Type),
                ("Mode".to_string(), ExportKind::Enum),
                ("Color".to_string(), ExportKind::Enum),
                ("limit".to_string(), ExportKind::Const),
                ("other".to_string(), ExportKind::Const),
                ("counter".to_string(), ExportKind::Const),
                ("shim".to_string(), ExportKind::Function),
            ]
        );
    }

    #[test]
    fn recognizes_default_exports() {
        let named = analyze("export default function handler() {}");
        assert_eq!(exported(&named), vec![("handler".to_string(), ExportKind::Default)]);

        let anonymous = analyze("export default class extends Base {}");
        assert_eq!(exported(&anonymous), vec![("default".to_string(), ExportKind::Default)]);

        let identifier = analyze("const app = 1;\nexport default app;");
        assert_eq!(exported(&identifier), vec![("app".to_string(), ExportKind::Default)]);

        let expression = analyze("export default { a: 1 };");
        assert_eq!(exported(&expression), vec![("default".to_string(), ExportKind::Default)]);
    }

    #[test]
    fn recognizes_multiline_reexports_with_aliases() {
        let analysis = analyze(
            "export {\n  alpha,\n  beta as gamma,\n  type Delta,\n}\nfrom './lib';\n\
             export * from './all';\n\
             export * as ns from './ns';",
        );
        assert_eq!(
            exported(&analysis),
            vec![
                ("alpha".to_string(), ExportKind::Reexport),
                ("gamma".to_string(), ExportKind::Reexport),
                ("Delta".to_string(), ExportKind::Reexport),
                ("*".to_string(), ExportKind::Reexport),
                ("ns".to_string(), ExportKind::Reexport),
            ]
        );
    }

    #[test]
    fn bare_export_list_without_semicolon_terminates() {
        let analysis = analyze("export { a, b }\nexport function c() {}");
        assert_eq!(
            exported(&analysis),
            vec![
                ("a".to_string(), ExportKind::Reexport),
                ("b".to_string(), ExportKind::Reexport),
                ("c".to_string(), ExportKind::Function),
            ]
        );
    }

    #[test]
    fn ignores_commented_out_code() {
        let analysis = analyze(
            "/*\nexport function hidden() {}\nimport x from 'x';\n*/\n\
             // export const nope = 1;\n\
             export const yes = 1;",
        );
        assert_eq!(exported(&analysis), vec![("yes".to_string(), ExportKind::Const)]);
        assert!(analysis.imports.is_empty());
    }

    #[test]
    fn comment_markers_inside_strings_are_code() {
        let analysis = analyze(
            "app.get('/api/*', handler);\n\
             export function kept() {}\n\
             const glob = \"**/*.ts\"; // trailing */ note\n\
             export const url = `http://host/*`;\n\
             /* export function hidden() {} */\n\
             export class Last {}\n",
        );
        assert_eq!(
            exported(&analysis),
            vec![
                ("kept".to_string(), ExportKind::Function),
                ("url".to_string(), ExportKind::Const),
                ("Last".to_string(), ExportKind::Class),
            ]
        );
    }

    #[test]
    fn classifies_import_forms() {
        let analysis = analyze(
            r#"
import './polyfill';
import React from 'react';
import { useState, useEffect as effect } from 'react';
import * as path from 'path';
import Default, { named } from './mixed';
import type { Props } from './types';
import {
  one,
  two,
} from './multi';
const fs = require('fs');
const { join, resolve: res } = require('path');
require('dotenv');
"#,
        );
        let imports: Vec<(String, Vec<String>)> = analysis
            .imports
            .iter()
            .map(|i| (i.source.clone(), i.symbols.clone()))
            .collect();
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        assert_eq!(
            imports,
            vec![
                ("./polyfill".to_string(), s(&[])),
                ("react".to_string(), s(&["React (default)"])),
                ("react".to_string(), s(&["useState", "effect"])),
                ("path".to_string(), s(&["* as path"])),
                ("./mixed".to_string(), s(&["Default (default)", "named"])),
                ("./types".to_string(), s(&["Props"])),
                ("./multi".to_string(), s(&["one", "two"])),
                ("fs".to_string(), s(&["fs (default)"])),
                ("path".to_string(), s(&["join", "res"])),
                ("dotenv".to_string(), s(&[])),
            ]
        );
    }

    #[test]
    fn destructured_and_generic_bindings() {
        let analysis = analyze(
            "export const { a, b: renamed, ...rest } = source;\n\
             export const cache: Map<string, number> = new Map();",
        );
        assert_eq!(
            exported(&analysis),
            vec![
                ("a".to_string(), ExportKind::Const),
                ("renamed".to_string(), ExportKind::Const),
                ("rest".to_string(), ExportKind::Const),
                ("cache".to_string(), ExportKind::Const),
            ]
        );
    }

    #[test]
    fn overloads_are_collapsed() {
        let analysis = analyze(
            "export function f(a: string): void;\n\
             export function f(a: number): void;\n\
             export function f(a: any) {}",
        );
        assert_eq!(exported(&analysis), vec![("f".to_string(), ExportKind::Function)]);
    }

    #[test]
    fn non_code_text_is_empty() {
        assert_eq!(analyze("just some prose\nwith lines"), FileAnalysis::default());
    }
}

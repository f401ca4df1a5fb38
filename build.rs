use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's own sources. Anything else under the
// repository root (vendored data, reference material) is not ours to police.
const SOURCE_ROOTS: [&str; 6] = ["shs", "session", "geo", "shared", "cli", "tests"];

const FORBIDDEN_WORDS: &str = r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)";

#[derive(Clone, Copy, PartialEq)]
enum Rule {
    UnderscorePrefix,
    ForbiddenWord,
    StarsInComment,
    AllCapsComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b",
            Rule::ForbiddenWord => FORBIDDEN_WORDS,
            Rule::StarsInComment => r"(//|/\*).*\*\*",
            Rule::AllCapsComment => r"(//|/\*|///).*",
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        }
    }

    fn headline(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => "underscore-prefixed identifiers",
            Rule::ForbiddenWord => "forbidden comment markers",
            Rule::StarsInComment => "'**' sequences in regular comments",
            Rule::AllCapsComment => "comments with all uppercase alphabetic characters",
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => {
                "Either use the binding (removing the underscore) or remove it completely."
            }
            Rule::ForbiddenWord => {
                "Comments describing edits ('FIX', 'NEW', 'UPDATE', ...) are not allowed. Describe the code as it is."
            }
            Rule::StarsInComment => "'**' is only allowed in doc comments.",
            Rule::AllCapsComment => "Strongly consider deleting the comment completely.",
            Rule::AllowDeadCode => "Either use the code or remove it completely.",
        }
    }

    // The build script names the forbidden words itself, so it is exempt from
    // the comment rules.
    fn checks_build_script(self) -> bool {
        matches!(self, Rule::UnderscorePrefix)
    }
}

struct Violations {
    rule: Rule,
    file_path: PathBuf,
    lines: Vec<String>,
}

impl Violations {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            lines: Vec::new(),
        }
    }

    fn accepts(&self, line_text: &str) -> bool {
        match self.rule {
            Rule::UnderscorePrefix => !is_comment(line_text) && !underscore_only_in_string(line_text),
            Rule::ForbiddenWord | Rule::AllowDeadCode => true,
            Rule::StarsInComment => !is_doc_comment(line_text),
            Rule::AllCapsComment => comment_body(line_text).is_some_and(|body| {
                let letters: Vec<char> = body.chars().filter(|c| c.is_alphabetic()).collect();
                !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
            }),
        }
    }

    fn into_error_message(self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.lines.len(),
            self.rule.headline(),
            self.file_path.display()
        );
        for line in &self.lines {
            message.push_str(&format!("   {line}\n"));
        }
        message.push_str(&format!("\n⚠️ {}\n", self.rule.advice()));
        Some(message)
    }
}

impl Sink for Violations {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.accepts(line_text) {
            self.lines.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*")
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

fn underscore_only_in_string(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(index, part)| index % 2 == 1 && part.contains('_'))
}

fn comment_body(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim_start_matches(['/', '!']).trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(match body.find("*/") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    })
}

fn rust_sources() -> Vec<PathBuf> {
    let mut sources = vec![PathBuf::from("build.rs")];
    for root in SOURCE_ROOTS {
        sources.extend(
            WalkDir::new(root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
                .map(|e| e.into_path()),
        );
    }
    sources
}

fn enforce(rule: Rule, sources: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern())?;
    let mut searcher = Searcher::new();

    for path in sources {
        if path.file_name().is_some_and(|name| name == "build.rs") && !rule.checks_build_script() {
            continue;
        }
        let mut violations = Violations::new(rule, path);
        searcher.search_path(&matcher, path, &mut violations)?;
        if let Some(message) = violations.into_error_message() {
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    let sources = rust_sources();
    let rules = [
        Rule::UnderscorePrefix,
        Rule::ForbiddenWord,
        Rule::StarsInComment,
        Rule::AllCapsComment,
        Rule::AllowDeadCode,
    ];
    for rule in rules {
        if let Err(e) = enforce(rule, &sources) {
            // Printed so the message shows up in cargo's output.
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

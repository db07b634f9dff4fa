use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Directories holding the crate's own Rust sources.
const SOURCE_ROOTS: [&str; 4] = ["select", "cli", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

// One source policy: a line pattern, a filter deciding whether a matched line
// really violates it, and the explanation printed on failure.
struct Rule {
    description: &'static str,
    pattern: &'static str,
    accepts: fn(&str) -> bool,
    advice: &'static str,
}

// Collects the violating lines of one file for one rule.
struct RuleCollector<'r> {
    rule: &'r Rule,
    violations: Vec<String>,
}

impl Sink for RuleCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.rule.accepts)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

impl RuleCollector<'_> {
    fn error_message(&self, file_path: &Path) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.description,
            file_path.display()
        );
        for violation in &self.violations {
            message.push_str(&format!("   {violation}\n"));
        }
        message.push_str(&format!("\n⚠️ {}\n", self.rule.advice));
        Some(message)
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || line.contains("/*")
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

// Text of a comment line without its marker.
fn comment_body(line: &str) -> Option<&str> {
    if let Some(idx) = line.find("//") {
        let rest = line[idx..].trim_start_matches('/').trim_start_matches('!');
        return Some(rest.trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
}

// Underscore-prefixed names in code, ignoring comments and string literals.
fn underscore_in_code(line: &str) -> bool {
    if is_comment(line) {
        return false;
    }
    let inside_string = line
        .split('"')
        .enumerate()
        .any(|(idx, part)| idx % 2 == 1 && part.contains('_'));
    !inside_string
}

fn forbidden_word_in_comment(line: &str) -> bool {
    comment_body(line).is_some_and(|body| FORBIDDEN_WORDS.iter().any(|word| body.contains(word)))
}

fn stars_outside_doc_comment(line: &str) -> bool {
    !is_doc_comment(line)
}

fn all_caps_comment(line: &str) -> bool {
    let Some(body) = comment_body(line) else {
        return false;
    };
    let mut letters = body.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

fn always(line: &str) -> bool {
    !line.is_empty()
}

fn rules() -> [Rule; 5] {
    [
        Rule {
            description: "underscore-prefixed names",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b",
            accepts: underscore_in_code,
            advice: "Underscore-prefixed names are not allowed. Use the binding or remove it.",
        },
        Rule {
            description: "forbidden comment markers",
            pattern: r"(//|/\*)",
            accepts: forbidden_word_in_comment,
            advice: "Comments describing edits (fix, change, update and similar markers in capitals) are not allowed. Delete them.",
        },
        Rule {
            description: "'**' in regular comments",
            pattern: r"(//|/\*).*\*\*",
            accepts: stars_outside_doc_comment,
            advice: "The '**' pattern is only allowed in doc comments.",
        },
        Rule {
            description: "all-uppercase comments",
            pattern: r"(//|/\*)",
            accepts: all_caps_comment,
            advice: "Comments whose letters are all uppercase are not allowed. Consider deleting the comment.",
        },
        Rule {
            description: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
            accepts: always,
            advice: "#[allow(dead_code)] is not allowed. Use the code or remove it.",
        },
    ]
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan_sources() -> Result<(), Box<dyn Error>> {
    let files = source_files();
    let mut searcher = Searcher::new();
    for rule in &rules() {
        let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
        for path in &files {
            let mut collector = RuleCollector {
                rule,
                violations: Vec::new(),
            };
            searcher.search_path(&matcher, path, &mut collector)?;
            if let Some(message) = collector.error_message(path) {
                return Err(message.into());
            }
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=STEPWISE_BUILD_TIMESTAMP={timestamp}");

    if let Err(e) = scan_sources() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

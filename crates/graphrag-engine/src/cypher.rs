//! Generated statement handling: prompt assembly, cleanup and validation.
//!
//! A generated statement is never executed until it has passed
//! [`StatementValidator`]'s read-only and schema checks.

use graphrag_core::{GraphRagError, GraphSchema};
use regex::Regex;

/// Clauses that can open a read statement.
const CLAUSE_STARTS: &[&str] = &["MATCH", "OPTIONAL MATCH", "WITH", "UNWIND", "CALL", "RETURN"];

/// Length of the line prefix used to recognise a repeated statement.
const DUPLICATE_KEY_CHARS: usize = 50;

// ── Prompts ──────────────────────────────────────────────────────

/// Inputs shared by the generation, repair and broadening prompts.
pub struct PromptContext<'a> {
    pub question: &'a str,
    pub schema: &'a GraphSchema,
    pub context: &'a str,
    pub history: &'a str,
}

pub fn generation_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = format!(
        "Question: {}\n\nGraph schema:\n{}\nRelevant entities:\n{}\n",
        ctx.question,
        ctx.schema.to_prompt_text(),
        ctx.context
    );
    if !ctx.history.is_empty() {
        prompt.push_str(&format!(
            "\nEarlier conversation (resolve references like \"they\" or \"those\" against it):\n{}\n",
            ctx.history
        ));
    }
    prompt
}

pub fn repair_prompt(ctx: &PromptContext<'_>, failed: &str, reason: &str) -> String {
    format!(
        "Question: {}\n\nGraph schema:\n{}\nFailed statement:\n{}\n\nFailure:\n{}\n",
        ctx.question,
        ctx.schema.to_prompt_text(),
        failed,
        reason
    )
}

pub fn broaden_prompt(ctx: &PromptContext<'_>, empty: &str) -> String {
    format!(
        "Question: {}\n\nGraph schema:\n{}\nRelevant entities:\n{}\nStatement that returned no rows:\n{}\n",
        ctx.question,
        ctx.schema.to_prompt_text(),
        ctx.context,
        empty
    )
}

// ── Cleanup ──────────────────────────────────────────────────────

/// Extract a single statement from raw model output.
///
/// Strips code fences and leading prose, drops statements the model
/// repeated, and keeps only the first statement when several were emitted.
pub fn clean_statement(raw: &str) -> String {
    let unfenced: Vec<&str> = raw
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();

    // Skip prose before the first clause.
    let start = unfenced
        .iter()
        .position(|line| starts_clause(line))
        .unwrap_or(0);

    let mut kept: Vec<&str> = Vec::new();
    let mut seen_keys: Vec<String> = Vec::new();
    let mut skipping = false;
    for line in &unfenced[start..] {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if starts_clause(trimmed) {
            let key: String = trimmed.chars().take(DUPLICATE_KEY_CHARS).collect();
            if seen_keys.contains(&key) {
                skipping = true;
                continue;
            }
            seen_keys.push(key);
            skipping = false;
        }
        if !skipping {
            kept.push(line);
        }
    }

    let mut statement = kept.join("\n");
    if let Some(idx) = statement.find(';') {
        statement.truncate(idx);
    }
    if let Some(cut) = second_statement_start(&statement) {
        statement.truncate(cut);
    }
    statement.trim().to_string()
}

fn starts_clause(line: &str) -> bool {
    let upper = line.trim_start().to_ascii_uppercase();
    CLAUSE_STARTS.iter().any(|clause| {
        upper.starts_with(clause)
            && upper[clause.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_')
    })
}

/// Byte offset of a `MATCH` that begins a new statement after a completed `RETURN`.
fn second_statement_start(statement: &str) -> Option<usize> {
    let upper = statement.to_ascii_uppercase();
    let first_return = word_positions(&upper, "RETURN").next()?;
    let cut = word_positions(&upper, "MATCH")
        .find(|&pos| pos > first_return && !upper[..pos].trim_end().ends_with("OPTIONAL"));
    cut
}

fn word_positions<'a>(haystack: &'a str, word: &'a str) -> impl Iterator<Item = usize> + 'a {
    haystack.match_indices(word).filter_map(move |(pos, _)| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + word.len()..].chars().next();
        let is_boundary = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric() && c != '_');
        (is_boundary(before) && is_boundary(after)).then_some(pos)
    })
}

// ── Validation ───────────────────────────────────────────────────

const LITERALS: &str = r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|//[^\n]*|/\*(?s:.*?)\*/"#;

/// Write clauses. A keyword directly after `.` is a property name, not a clause.
const WRITES: &str = r"(?i)(?:^|[^.\w])(CREATE|MERGE|DELETE|DETACH|SET|REMOVE|DROP|FOREACH|LOAD\s+CSV)\b";

const PROCEDURE_CALLS: &str = r"(?i)\bCALL\s+([A-Za-z_][A-Za-z0-9_.]*)";

/// Procedures a generated statement may call. Everything else is rejected.
const READ_PROCEDURES: &str = r"^db\.(?:labels|relationshipTypes|propertyKeys|schema\.[A-Za-z]+|index\.(?:vector|fulltext)\.query[A-Za-z]*)$";

const NODE_LABELS: &str = r"\(\s*[A-Za-z_][A-Za-z0-9_]*\s*((?::\s*`?[A-Za-z_][A-Za-z0-9_]*`?\s*)+)|\(\s*((?::\s*`?[A-Za-z_][A-Za-z0-9_]*`?\s*)+)";

const REL_TYPES: &str = r"\[\s*[A-Za-z0-9_]*\s*:\s*(`?[A-Za-z_][A-Za-z0-9_]*`?(?:\s*\|\s*:?\s*`?[A-Za-z_][A-Za-z0-9_]*`?)*)";

/// Read-only and schema checks applied to every generated statement.
#[derive(Debug, Clone)]
pub struct StatementValidator {
    literals: Regex,
    writes: Regex,
    procedure_calls: Regex,
    read_procedures: Regex,
    node_labels: Regex,
    rel_types: Regex,
}

fn compile(pattern: &str) -> Result<Regex, GraphRagError> {
    Regex::new(pattern).map_err(|e| GraphRagError::Internal(format!("statement pattern: {e}")))
}

impl StatementValidator {
    pub fn new() -> Result<Self, GraphRagError> {
        Ok(Self {
            literals: compile(LITERALS)?,
            writes: compile(WRITES)?,
            procedure_calls: compile(PROCEDURE_CALLS)?,
            read_procedures: compile(READ_PROCEDURES)?,
            node_labels: compile(NODE_LABELS)?,
            rel_types: compile(REL_TYPES)?,
        })
    }

    /// Remove string literals and comments so keywords inside them are ignored.
    fn strip_literals(&self, statement: &str) -> String {
        self.literals.replace_all(statement, "''").into_owned()
    }

    /// Reject statements that could modify the graph, including calls to
    /// any procedure outside the read-only allowlist.
    pub fn check_read_only(&self, statement: &str) -> Result<(), GraphRagError> {
        let code = self.strip_literals(statement);
        if let Some(clause) = self.writes.captures(&code).and_then(|c| c.get(1)) {
            return Err(GraphRagError::UnsafeStatement(format!(
                "write operation '{}' is not allowed",
                clause.as_str()
            )));
        }
        for caps in self.procedure_calls.captures_iter(&code) {
            if let Some(name) = caps.get(1) {
                if !self.read_procedures.is_match(name.as_str()) {
                    return Err(GraphRagError::UnsafeStatement(format!(
                        "procedure '{}' is not allowed",
                        name.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Labels and relationship types referenced in node and relationship patterns.
    pub fn referenced_elements(&self, statement: &str) -> (Vec<String>, Vec<String>) {
        let code = self.strip_literals(statement);
        let clean = |s: &str| s.trim().trim_matches('`').trim().to_string();

        let mut labels = Vec::new();
        for caps in self.node_labels.captures_iter(&code) {
            if let Some(group) = caps.get(1).or_else(|| caps.get(2)) {
                for label in group.as_str().split(':').map(clean).filter(|l| !l.is_empty()) {
                    if !labels.contains(&label) {
                        labels.push(label);
                    }
                }
            }
        }

        let mut rel_types = Vec::new();
        for caps in self.rel_types.captures_iter(&code) {
            if let Some(group) = caps.get(1) {
                for rel in group
                    .as_str()
                    .split('|')
                    .map(|r| clean(r.trim().trim_start_matches(':')))
                    .filter(|r| !r.is_empty())
                {
                    if !rel_types.contains(&rel) {
                        rel_types.push(rel);
                    }
                }
            }
        }

        (labels, rel_types)
    }

    /// Reject statements naming labels or relationship types absent from the schema.
    ///
    /// An empty schema (nothing introspected) accepts everything.
    pub fn check_schema(&self, statement: &str, schema: &GraphSchema) -> Result<(), GraphRagError> {
        if schema.is_empty() {
            return Ok(());
        }
        let (labels, rel_types) = self.referenced_elements(statement);
        let mut unknown: Vec<String> = labels
            .into_iter()
            .filter(|l| !schema.has_label(l))
            .map(|l| format!("label {l}"))
            .collect();
        unknown.extend(
            rel_types
                .into_iter()
                .filter(|r| !schema.has_relationship_type(r))
                .map(|r| format!("relationship type {r}")),
        );
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(GraphRagError::SchemaViolation(unknown.join(", ")))
        }
    }

    /// Both checks; an empty statement counts as a syntax error.
    pub fn validate(&self, statement: &str, schema: &GraphSchema) -> Result<(), GraphRagError> {
        if statement.trim().is_empty() {
            return Err(GraphRagError::QuerySyntax("no statement was generated".into()));
        }
        self.check_read_only(statement)?;
        self.check_schema(statement, schema)
    }
}

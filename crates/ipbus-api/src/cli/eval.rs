//! Label expression evaluation.

use anyhow::{Result, bail};
use console::style;

use ipbus_types::{LabelOp, LabelSet};

/// Build `all(..) & any(..) & !any(..)` from label lists.
///
/// Empty lists drop out of the expression; with every list empty the
/// expression is `true`.
pub fn build_expression(all: &[String], any: &[String], none: &[String]) -> LabelOp {
    let mut clauses = Vec::new();

    if let Some(op) = fold(all, |l, r| l.and(r)) {
        clauses.push(op);
    }
    if let Some(op) = fold(any, |l, r| l.or(r)) {
        clauses.push(op);
    }
    if let Some(op) = fold(none, |l, r| l.or(r)) {
        clauses.push(!op);
    }

    clauses
        .into_iter()
        .reduce(|l, r| l.and(r))
        .unwrap_or(LabelOp::True)
}

fn fold(labels: &[String], combine: fn(LabelOp, LabelOp) -> LabelOp) -> Option<LabelOp> {
    labels
        .iter()
        .map(|label| LabelOp::literal(label.as_str()))
        .reduce(combine)
}

/// Print whether the expression built from `all`, `any` and `none` selects a
/// session carrying `labels`.
pub fn eval(
    labels: Vec<String>,
    all: Vec<String>,
    any: Vec<String>,
    none: Vec<String>,
    json: bool,
) -> Result<()> {
    let set: LabelSet = labels.into_iter().filter(|l| !l.is_empty()).collect();
    if set.is_empty() {
        bail!("at least one non-empty label is required");
    }

    let expression = build_expression(&all, &any, &none);
    let matched = expression.matches(&set);

    if json {
        let output = serde_json::json!({
            "labels": set,
            "expression": expression.to_string(),
            "tree": expression,
            "matches": matched,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {}  {}", style("Labels:").bold(), set);
    println!("  {}  {}", style("Expression:").bold(), style(&expression).cyan());
    if matched {
        println!("  {} selects this session", style("✓").green().bold());
    } else {
        println!("  {} does not select this session", style("✗").red().bold());
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipbus_types::labels;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_lists_build_true() {
        assert_eq!(build_expression(&[], &[], &[]), LabelOp::True);
    }

    #[test]
    fn all_requires_every_label() {
        let op = build_expression(&strings(&["a", "b"]), &[], &[]);
        assert!(op.matches(&labels!("a", "b", "c")));
        assert!(!op.matches(&labels!("a")));
    }

    #[test]
    fn any_requires_one_label() {
        let op = build_expression(&[], &strings(&["a", "b"]), &[]);
        assert!(op.matches(&labels!("b")));
        assert!(!op.matches(&labels!("c")));
    }

    #[test]
    fn none_excludes_labels() {
        let op = build_expression(&strings(&["worker"]), &[], &strings(&["busy", "draining"]));
        assert!(op.matches(&labels!("worker")));
        assert!(!op.matches(&labels!("worker", "draining")));
    }

    #[test]
    fn eval_rejects_empty_label_set() {
        assert!(eval(strings(&[""]), vec![], vec![], vec![], true).is_err());
    }
}

use std::fmt;

use serde::Deserialize;

/// Whether a load task clears its target table before inserting.
///
/// - `DeleteAll`: issue `DELETE FROM <table>` first, then insert. The insert
///   is only attempted if the delete succeeded.
/// - `None`: append-only; existing rows are left untouched.
///
/// Config files may also spell these `append`, `delete` or `truncate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    #[serde(alias = "append")]
    None,
    #[serde(alias = "delete", alias = "truncate")]
    DeleteAll,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        ResetPolicy::DeleteAll
    }
}

/// Discriminant of a task's behaviour, without the per-kind payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Structural marker (Begin / End); never touches the warehouse.
    Sentinel,
    /// Raw SQL script, e.g. schema creation.
    Statement,
    /// Bulk copy from object storage into a staging table.
    Stage,
    LoadFact,
    LoadDimension,
    QualityCheck,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Sentinel => "sentinel",
            TaskKind::Statement => "statement",
            TaskKind::Stage => "stage",
            TaskKind::LoadFact => "load_fact",
            TaskKind::LoadDimension => "load_dimension",
            TaskKind::QualityCheck => "quality_check",
        };
        f.write_str(s)
    }
}

/// Parse a duration string such as `"500ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    use std::time::Duration;

    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

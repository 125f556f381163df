//! Backend B: free-text report from `<tool> <file>`.
//!
//! Parsing is table driven: each row names a field, the pattern that
//! captures it, and how the captures are coerced.

use crate::model::{Metadata, MetadataSource, Vec3};
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    PointCount,
    Version,
    BoundsMin,
    BoundsMax,
    Offset,
    Scale,
}

#[derive(Debug, Clone, Copy)]
enum Coerce {
    Count,
    Text,
    Vector,
}

struct LineRule {
    field: Field,
    pattern: &'static str,
    coerce: Coerce,
}

const GRAMMAR: &[LineRule] = &[
    LineRule {
        field: Field::PointCount,
        pattern: r"(?i)Number of Point Records:\s+(\d+)",
        coerce: Coerce::Count,
    },
    LineRule {
        field: Field::Version,
        pattern: r"(?i)Version:\s+([\d.]+)",
        coerce: Coerce::Text,
    },
    LineRule {
        field: Field::BoundsMin,
        pattern: r"(?i)Min X Y Z:\s+([\d.-]+)\s+([\d.-]+)\s+([\d.-]+)",
        coerce: Coerce::Vector,
    },
    LineRule {
        field: Field::BoundsMax,
        pattern: r"(?i)Max X Y Z:\s+([\d.-]+)\s+([\d.-]+)\s+([\d.-]+)",
        coerce: Coerce::Vector,
    },
    LineRule {
        field: Field::Offset,
        pattern: r"(?i)Offset X Y Z:\s+([\d.-]+)\s+([\d.-]+)\s+([\d.-]+)",
        coerce: Coerce::Vector,
    },
    LineRule {
        field: Field::Scale,
        pattern: r"(?i)Scale Factor X Y Z:\s+([\d.e-]+)\s+([\d.e-]+)\s+([\d.e-]+)",
        coerce: Coerce::Vector,
    },
];

static COMPILED: LazyLock<Vec<(&'static LineRule, Regex)>> = LazyLock::new(|| {
    GRAMMAR
        .iter()
        .map(|rule| (rule, Regex::new(rule.pattern).unwrap()))
        .collect()
});

enum Value {
    Count(u64),
    Text(String),
    Vector(Vec3),
}

fn coerce(caps: &regex::Captures<'_>, how: Coerce) -> Option<Value> {
    let group = |i: usize| caps.get(i).map(|m| m.as_str());
    match how {
        Coerce::Count => group(1)?.parse().ok().map(Value::Count),
        Coerce::Text => group(1).map(|s| Value::Text(s.to_string())),
        Coerce::Vector => {
            let x = group(1)?.parse().ok()?;
            let y = group(2)?.parse().ok()?;
            let z = group(3)?.parse().ok()?;
            Some(Value::Vector(Vec3 { x, y, z }))
        }
    }
}

/// Apply every rule to the report. The first match of each rule wins; a
/// capture that fails coercion leaves its field unset.
pub fn parse(report: &str) -> Metadata {
    let mut meta = Metadata {
        source: Some(MetadataSource::Report),
        ..Default::default()
    };
    for (rule, re) in COMPILED.iter() {
        let Some(value) = re
            .captures(report)
            .and_then(|caps| coerce(&caps, rule.coerce))
        else {
            continue;
        };
        match (rule.field, value) {
            (Field::PointCount, Value::Count(n)) => meta.point_count = Some(n),
            (Field::Version, Value::Text(v)) => meta.format_version = Some(v),
            (Field::BoundsMin, Value::Vector(v)) => meta.bounds_min = Some(v),
            (Field::BoundsMax, Value::Vector(v)) => meta.bounds_max = Some(v),
            (Field::Offset, Value::Vector(v)) => meta.offset = Some(v),
            (Field::Scale, Value::Vector(v)) => meta.scale = Some(v),
            _ => {}
        }
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    const LASINFO_FIXTURE: &str = "\
lasinfo (240220) report for 'site.las'
reporting all LAS header entries:
  file signature:             'LASF'
  file source ID:             0
  global_encoding:            0
  project ID GUID data 1-4:   00000000-0000-0000-0000-000000000000
  Version:                    1.2
  system identifier:          'RIEGL VUX-1'
  generating software:        'TerraScan'
  header size:                227
  Number of Point Records:    10653248
  Scale Factor X Y Z:         0.01 0.01 0.01
  Offset X Y Z:               -0.00 -0.00 -0.00
  Min X Y Z:                  635619.85 848899.70 406.59
  Max X Y Z:                  636078.12 849383.47 472.31
";

    #[test]
    fn parses_literal_report() {
        let meta = parse(LASINFO_FIXTURE);
        assert_eq!(meta.point_count, Some(10_653_248));
        assert_eq!(meta.format_version.as_deref(), Some("1.2"));
        assert_eq!(
            meta.bounds_min,
            Some(Vec3 {
                x: 635619.85,
                y: 848899.70,
                z: 406.59
            })
        );
        assert_eq!(meta.bounds_max.map(|v| v.z), Some(472.31));
        assert_eq!(meta.offset.map(|v| v.x), Some(-0.0));
        assert_eq!(meta.scale.map(|v| v.y), Some(0.01));
        assert_eq!(meta.source, Some(MetadataSource::Report));
        // Software/system are not part of the report grammar.
        assert!(meta.software.is_none());
        assert_eq!(meta.field_count(), 6);
    }

    #[test]
    fn patterns_are_case_insensitive() {
        let meta = parse("number of point records:  17\nscale factor x y z: 1e-3 1e-3 1e-3\n");
        assert_eq!(meta.point_count, Some(17));
        assert_eq!(meta.scale.map(|v| v.x), Some(0.001));
    }

    #[test]
    fn uncoercible_capture_leaves_field_unset() {
        let meta = parse("Min X Y Z: 1.2.3 4 5\nMax X Y Z: 1 2 3\n");
        assert!(meta.bounds_min.is_none());
        assert_eq!(meta.bounds_max.map(|v| v.x), Some(1.0));
    }

    #[test]
    fn unrelated_output_yields_no_fields() {
        let meta = parse("ERROR: cannot open 'site.las'\n");
        assert!(meta.is_empty());
    }
}

//! A reader for the standard seven-column SWC text format.
//!
//! Each non-comment line is `id type x y z radius parent`. Samples of type 1
//! form the soma; every other sample whose parent is a soma sample (or that
//! has no parent) roots an arbor. Arbors are split into sections at branch
//! points, and every child section starts with a copy of its branch point so
//! that sections stay connected.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use nalgebra::{Point3, Vector3};

use crate::error::{MorphError, Result};
use crate::morphology::{ArborKind, Morphology, Sample, SectionId, Soma};


/// One parsed SWC line.
#[derive(Debug, Clone, Copy)]
struct Record {
    id: usize,
    kind: u32,
    point: Point3<f32>,
    radius: f32,
    parent: Option<usize>,
}

const SOMA_TYPE: u32 = 1;

/// Reads an SWC file. The morphology is labelled with the file stem.
pub fn read_swc<P: AsRef<Path>>(path: P) -> Result<Morphology> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let label = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("morphology");
    let morph = parse_swc(&text, label)?;
    info!(
        "read {} with {} arbors and {} sections",
        path.display(),
        morph.arbors.len(),
        morph.num_sections()
    );
    Ok(morph)
}

/// Parses SWC text into a morphology.
pub fn parse_swc(text: &str, label: &str) -> Result<Morphology> {
    let records = parse_records(text)?;
    if records.is_empty() {
        return Err(MorphError::EmptyMorphology);
    }

    let index: HashMap<usize, usize> = records.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (i, record) in records.iter().enumerate() {
        if let Some(parent) = record.parent {
            let p = *index.get(&parent).ok_or(MorphError::UnknownParent {
                sample: record.id,
                parent,
            })?;
            children[p].push(i);
        }
    }

    let soma = build_soma(&records)?;
    let mut morph = Morphology::new(label, soma);

    let is_soma = |i: usize| records[i].kind == SOMA_TYPE;
    let roots = (0..records.len()).filter(|&i| {
        !is_soma(i)
            && match records[i].parent {
                Some(parent) => is_soma(index[&parent]),
                None => true,
            }
    });

    for root in roots.collect::<Vec<_>>() {
        let kind = arbor_kind(records[root].kind);
        // (first sample, branch point to prepend, parent section)
        let mut stack: Vec<(usize, Option<usize>, Option<SectionId>)> = vec![(root, None, None)];
        while let Some((first, branch_point, parent)) = stack.pop() {
            let mut samples = Vec::new();
            if let Some(b) = branch_point {
                samples.push(to_sample(&records[b]));
            }
            let mut current = first;
            loop {
                samples.push(to_sample(&records[current]));
                if children[current].len() != 1 {
                    break;
                }
                current = children[current][0];
            }

            let id = match parent {
                Some(parent) => morph.add_section(parent, samples),
                None => morph.add_arbor(kind, samples),
            };
            for &child in children[current].iter().rev() {
                stack.push((child, Some(current), Some(id)));
            }
        }
    }

    if morph.arbors.is_empty() {
        warn!("{} has a soma but no arbors", label);
    }
    Ok(morph)
}

fn parse_records(text: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line_number = n + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            return Err(MorphError::Parse {
                line: line_number,
                message: format!("expected 7 columns, found {}", fields.len()),
            });
        }
        let error = |what: &str, value: &str| MorphError::Parse {
            line: line_number,
            message: format!("invalid {} '{}'", what, value),
        };
        let float = |i: usize, what: &str| {
            fields[i]
                .parse::<f32>()
                .map_err(|_| error(what, fields[i]))
        };

        let id = fields[0].parse::<usize>().map_err(|_| error("id", fields[0]))?;
        let kind = fields[1].parse::<u32>().map_err(|_| error("type", fields[1]))?;
        let point = Point3::new(float(2, "x")?, float(3, "y")?, float(4, "z")?);
        let radius = float(5, "radius")?;
        let parent = fields[6]
            .parse::<i64>()
            .map_err(|_| error("parent", fields[6]))?;

        records.push(Record {
            id,
            kind,
            point,
            radius,
            parent: (parent >= 0).then_some(parent as usize),
        });
    }
    Ok(records)
}

/// Soma from the type-1 samples: centroid is their mean, the reported radius
/// their mean radius. Multi-sample somata also supply a profile.
fn build_soma(records: &[Record]) -> Result<Soma> {
    let soma: Vec<&Record> = records.iter().filter(|r| r.kind == SOMA_TYPE).collect();
    if soma.is_empty() {
        return Err(MorphError::MissingSoma);
    }
    let n = soma.len() as f32;
    let centroid = Point3::from(soma.iter().map(|r| r.point.coords).sum::<Vector3<f32>>() / n);
    let radius = soma.iter().map(|r| r.radius).sum::<f32>() / n;
    let profile = if soma.len() > 1 {
        soma.iter().map(|r| r.point).collect()
    } else {
        Vec::new()
    };
    debug!("soma from {} samples, reported radius {}", soma.len(), radius);
    Ok(Soma::new(centroid, radius, profile))
}

fn arbor_kind(swc_type: u32) -> ArborKind {
    match swc_type {
        2 => ArborKind::Axon,
        3 => ArborKind::BasalDendrite,
        4 => ArborKind::ApicalDendrite,
        other => {
            debug!("custom sample type {} read as a basal dendrite", other);
            ArborKind::BasalDendrite
        }
    }
}

fn to_sample(record: &Record) -> Sample {
    Sample::new(record.id, record.point, record.radius)
}

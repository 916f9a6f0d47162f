//! Drawing files.
//!
//! A drawing file is turned into the same wire messages a user would type.
//! The only format supported is ASCII DXF, and only its `LINE`, `CIRCLE` and
//! `ARC` entities; everything else in the file is skipped.
//!
//! DXF is a flat list of group code / value line pairs:
//!
//! ```text
//!   0          <- code 0 starts a section, entity, or end marker
//! SECTION
//!   2
//! ENTITIES
//!   0
//! LINE
//!  10          <- x of first point
//! 0.0
//! ...
//! ```

use std::collections::HashMap;
use std::path::Path;

use plotkit_protocol::{DrawingCommand, OutgoingMessage};

use crate::error::DrawingError;

/// Anything that turns a file into a sequence of drawing commands.
pub trait DrawingSource: Send + Sync {
    /// Load the file at `path` and return its commands in drawing order.
    fn load(&self, path: &Path) -> Result<Vec<OutgoingMessage>, DrawingError>;
}

/// Reads ASCII DXF files.
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfDrawingSource;

impl DrawingSource for DxfDrawingSource {
    fn load(&self, path: &Path) -> Result<Vec<OutgoingMessage>, DrawingError> {
        let text = std::fs::read_to_string(path).map_err(|source| DrawingError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        parse_dxf(&text)
    }
}

#[derive(Debug)]
struct Entity {
    kind: String,
    values: HashMap<i32, f64>,
}

impl Entity {
    fn value(&self, code: i32) -> Result<f64, DrawingError> {
        self.values
            .get(&code)
            .copied()
            .ok_or_else(|| DrawingError::IncompleteEntity {
                entity: self.kind.clone(),
                code,
            })
    }
}

/// Group codes the plotter cares about: points, radius, angles.
const GEOMETRY_CODES: [i32; 7] = [10, 20, 11, 21, 40, 50, 51];

/// Parse the text of an ASCII DXF file.
pub fn parse_dxf(text: &str) -> Result<Vec<OutgoingMessage>, DrawingError> {
    let mut lines = text.lines().enumerate();
    let mut in_entities = false;
    let mut expect_section_name = false;
    let mut current: Option<Entity> = None;
    let mut commands = Vec::new();

    while let Some((index, code_line)) = lines.next() {
        let line = index + 1;
        let code_text = code_line.trim();
        if code_text.is_empty() {
            continue;
        }
        let code: i32 = code_text.parse().map_err(|_| DrawingError::InvalidGroupCode {
            line,
            code: code_text.to_string(),
        })?;
        let (_, value_line) = lines.next().ok_or(DrawingError::MissingValue { line })?;
        let value = value_line.trim();

        if code == 0 {
            if let Some(entity) = current.take() {
                entity_commands(&entity, &mut commands)?;
            }
            match value {
                "SECTION" => expect_section_name = true,
                "ENDSEC" => in_entities = false,
                _ if in_entities => {
                    current = Some(Entity {
                        kind: value.to_string(),
                        values: HashMap::new(),
                    })
                }
                _ => {}
            }
            continue;
        }

        if expect_section_name && code == 2 {
            in_entities = value == "ENTITIES";
            expect_section_name = false;
            continue;
        }

        if let Some(entity) = current.as_mut() {
            if GEOMETRY_CODES.contains(&code) && !entity.values.contains_key(&code) {
                let number: f64 = value.parse().map_err(|_| DrawingError::InvalidNumber {
                    line: line + 1,
                    value: value.to_string(),
                })?;
                entity.values.insert(code, number);
            }
        }
    }

    if let Some(entity) = current.take() {
        entity_commands(&entity, &mut commands)?;
    }
    Ok(commands)
}

fn entity_commands(entity: &Entity, out: &mut Vec<OutgoingMessage>) -> Result<(), DrawingError> {
    match entity.kind.as_str() {
        "LINE" => out.push(message(
            DrawingCommand::Line,
            [
                truncate(entity.value(10)?),
                truncate(entity.value(20)?),
                truncate(entity.value(11)?),
                truncate(entity.value(21)?),
            ],
        )),
        "CIRCLE" => out.push(message(
            DrawingCommand::Circle,
            [
                truncate(entity.value(10)?),
                truncate(entity.value(20)?),
                entity.value(40)?.round() as i64,
            ],
        )),
        "ARC" => {
            let (cx, cy) = (entity.value(10)?, entity.value(20)?);
            let radius = entity.value(40)?;
            let start = entity.value(50)?.to_radians();
            let end = entity.value(51)?;

            // The firmware draws arcs from the current head position.
            out.push(message(
                DrawingCommand::Move,
                [
                    (cx + start.cos() * radius).round() as i64,
                    (cy + start.sin() * radius).round() as i64,
                ],
            ));
            out.push(message(
                DrawingCommand::Arc,
                [truncate(cx), truncate(cy), truncate(-end)],
            ));
        }
        other => tracing::trace!(entity = other, "skipping unsupported entity"),
    }
    Ok(())
}

fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

fn message<const N: usize>(cmd: DrawingCommand, params: [i64; N]) -> OutgoingMessage {
    OutgoingMessage::new(cmd.wire_name(), params.iter().map(i64::to_string))
}

use std::io::{self, Write};

use clap::ValueEnum;
use libifstat::{BucketIndex, MergedStats, StatsStore};
use serde_json::{json, Map, Value};

use crate::engine::ReplayStats;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One line per enabled filter
    #[default]
    Table,
    /// JSON object keyed by filter
    Json,
}

pub struct Report<'a> {
    pub stats: &'a StatsStore,
    pub replay: ReplayStats,
    pub per_context: bool,
}

impl Report<'_> {
    pub fn write(&self, format: Format, out: &mut dyn Write) -> io::Result<()> {
        match format {
            Format::Table => self.write_table(out),
            Format::Json => self.write_json(out),
        }
    }

    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{} frames replayed, {} skipped",
            self.replay.frames, self.replay.skipped
        )?;
        write_table(out, "total", &self.stats.merged())?;
        if self.per_context {
            for i in 0..self.stats.num_contexts() {
                if let Some(ctx) = self.stats.context(i) {
                    write_table(out, &format!("context {}", i), &ctx.snapshot())?;
                }
            }
        }
        Ok(())
    }

    fn write_json(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut root = Map::new();
        root.insert(
            "replay".to_owned(),
            json!({
                "blocks": self.replay.blocks,
                "frames": self.replay.frames,
                "skipped": self.replay.skipped,
            }),
        );
        root.insert("filters".to_owned(), serde_json::to_value(self.stats.merged())?);
        if self.per_context {
            let contexts = (0..self.stats.num_contexts())
                .filter_map(|i| self.stats.context(i))
                .map(|ctx| serde_json::to_value(ctx.snapshot()))
                .collect::<Result<Vec<_>, _>>()?;
            root.insert("contexts".to_owned(), Value::Array(contexts));
        }
        serde_json::to_writer_pretty(&mut *out, &Value::Object(root))?;
        writeln!(out)
    }
}

fn write_table(out: &mut dyn Write, title: &str, stats: &MergedStats) -> io::Result<()> {
    write!(out, "{:<10}", title)?;
    for b in BucketIndex::ALL {
        write!(out, " {:>12}", b.label())?;
    }
    writeln!(out)?;
    for (id, counters) in stats.iter() {
        write!(out, "{:<10}", id.to_string())?;
        for b in BucketIndex::ALL {
            write!(out, " {:>12}", counters.get(b))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

//! Table output formatting using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{IterationOutcome, Phase, Tier};

/// A table with bold headers that wraps to the terminal width.
pub fn create_table<I, S>(headers: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .into_iter()
            .map(|h| Cell::new(h.into()).add_attribute(Attribute::Bold)),
    );
    table
}

pub fn phase_cell(phase: Phase) -> Cell {
    let color = match phase {
        Phase::Seed => Color::Grey,
        Phase::AutoA | Phase::AutoB => Color::Cyan,
        Phase::HumanA | Phase::HumanB => Color::Yellow,
        Phase::Finalize => Color::Green,
    };
    Cell::new(phase.as_str()).fg(color)
}

pub fn tier_cell(tier: Tier) -> Cell {
    let color = match tier {
        Tier::High => Color::Green,
        Tier::Medium => Color::Blue,
        Tier::Open => Color::Yellow,
    };
    Cell::new(tier.as_str()).fg(color)
}

pub fn outcome_cell(outcome: IterationOutcome) -> Cell {
    let color = match outcome {
        IterationOutcome::Continued => Color::Cyan,
        IterationOutcome::Converged | IterationOutcome::MaxIterationsReached => Color::Green,
        IterationOutcome::Failed => Color::Red,
        IterationOutcome::Cancelled => Color::Yellow,
    };
    Cell::new(outcome.as_str()).fg(color)
}

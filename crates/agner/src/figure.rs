//! Text figures.
//!
//! Plotters describe what to draw; rendering is a fixed-width bar chart so the
//! harness can display results in a terminal or write them to files.

use std::fmt::Write as FmtWrite;

/// A named series of values, one per category.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// Chart under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Category labels along the x axis.
    pub categories: Vec<String>,
    pub series: Vec<Series>,
}

impl Figure {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = title.into();
        self
    }

    pub fn set_labels(&mut self, x: impl Into<String>, y: impl Into<String>) -> &mut Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }

    pub fn set_categories<I, S>(&mut self, categories: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_series(&mut self, name: impl Into<String>, values: Vec<f64>) -> &mut Self {
        self.series.push(Series {
            name: name.into(),
            values,
        });
        self
    }

    /// True if nothing has been drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.values.is_empty())
    }

    /// Render as text. `width` is the length of the longest bar.
    #[must_use]
    pub fn render(&self, width: usize) -> String {
        let mut out = String::new();
        if !self.title.is_empty() {
            let _ = writeln!(out, "{}", self.title);
            let _ = writeln!(out, "{}", "=".repeat(self.title.chars().count()));
        }
        if !self.y_label.is_empty() || !self.x_label.is_empty() {
            let _ = writeln!(out, "{} by {}", self.y_label, self.x_label);
        }

        let max = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let rows = self
            .series
            .iter()
            .map(|s| s.values.len())
            .max()
            .unwrap_or(0)
            .max(self.categories.len());
        let label_width = (0..rows)
            .map(|i| self.category(i).chars().count())
            .max()
            .unwrap_or(0);
        let name_width = self
            .series
            .iter()
            .map(|s| s.name.chars().count())
            .max()
            .unwrap_or(0);

        for row in 0..rows {
            let category = self.category(row);
            for (index, series) in self.series.iter().enumerate() {
                let Some(&value) = series.values.get(row) else {
                    continue;
                };
                let label = if index == 0 { category.as_str() } else { "" };
                let _ = writeln!(
                    out,
                    "{label:>label_width$} | {name:<name_width$} {bar} {value}",
                    name = series.name,
                    bar = bar(value, max, width),
                    value = format_value(value),
                );
            }
        }
        out
    }

    fn category(&self, index: usize) -> String {
        self.categories
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bar(value: f64, max: f64, width: usize) -> String {
    if !value.is_finite() || max <= 0.0 {
        return String::new();
    }
    let len = ((value.abs() / max) * width as f64).round() as usize;
    "#".repeat(len.min(width))
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.3}")
    }
}

/// File-system friendly name: lowercase, spaces replaced by underscores.
#[must_use]
pub fn safe_name(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

/// Expand `{test}` and `{subtest}` in an output path template.
#[must_use]
pub fn expand_template(template: &str, group: &str, subtest: &str) -> String {
    template
        .replace("{test}", &safe_name(group))
        .replace("{subtest}", &safe_name(subtest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_bars() {
        let mut figure = Figure::new();
        figure
            .set_title("Branches")
            .set_labels("alignment", "cycles")
            .set_categories(["16", "4096"])
            .add_series("Core cyc", vec![2.0, 4.0]);

        let text = figure.render(8);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Branches");
        assert_eq!(lines[1], "========");
        assert_eq!(lines[2], "cycles by alignment");
        assert_eq!(lines[3], "  16 | Core cyc #### 2");
        assert_eq!(lines[4], "4096 | Core cyc ######## 4");
    }

    #[test]
    fn test_render_fractional_and_missing() {
        let mut figure = Figure::new();
        figure
            .add_series("a", vec![0.5, 1.0])
            .add_series("bb", vec![1.0]);

        let text = figure.render(4);
        assert_eq!(text, "0 | a  ## 0.500\n  | bb #### 1\n1 | a  #### 1\n");
    }

    #[test]
    fn test_empty_figure() {
        let figure = Figure::new();
        assert!(figure.is_empty());
        assert_eq!(figure.render(10), "");
    }

    #[test]
    fn test_template() {
        assert_eq!(
            expand_template("plots/{test}-{subtest}.txt", "BTB size", "Ahead Taken"),
            "plots/btb_size-ahead_taken.txt"
        );
    }
}

//! Chart descriptions handed to the host's chart widget.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::datetime::MONTHS_TR;
use crate::model::{
    DashboardStats, Frequency, Machine, MaintenanceSchedule, MonthlyDistribution, category_color,
    category_label, chart_colors,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Doughnut,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<u64>,
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartSpec {
    fn new(kind: ChartKind, title: &str, labels: Vec<String>) -> Self {
        Self {
            kind,
            title: title.to_string(),
            labels,
            datasets: Vec::new(),
        }
    }

    fn dataset(mut self, label: &str, data: Vec<u64>, colors: Vec<String>) -> Self {
        self.datasets.push(Dataset {
            label: label.to_string(),
            data,
            colors,
        });
        self
    }

    /// Sum of every dataset value; zero means an empty chart.
    pub fn total(&self) -> u64 {
        self.datasets.iter().flat_map(|d| d.data.iter()).sum()
    }
}

/// (text, grid) colours for the current theme.
pub fn theme_colors(dark: bool) -> (&'static str, &'static str) {
    if dark {
        ("#f3f4f6", "#374151")
    } else {
        ("#1f2937", "#e5e7eb")
    }
}

pub fn monthly_distribution(distribution: &MonthlyDistribution) -> ChartSpec {
    let labels = MONTHS_TR.iter().map(|m| m.to_string()).collect();
    let series = |pick: fn(&crate::model::MonthBucket) -> u64| {
        distribution.iter().map(pick).collect::<Vec<_>>()
    };
    ChartSpec::new(ChartKind::Line, "Aylık Bakım Dağılımı", labels)
        .dataset(
            "Planlandı",
            series(|b| b.scheduled),
            vec![chart_colors::INFO.to_string()],
        )
        .dataset(
            "Tamamlandı",
            series(|b| b.completed),
            vec![chart_colors::SUCCESS.to_string()],
        )
        .dataset(
            "Gecikmiş",
            series(|b| b.overdue),
            vec![chart_colors::DANGER.to_string()],
        )
}

pub fn status_distribution(stats: &DashboardStats) -> ChartSpec {
    let labels = ["Bekleyen", "Tamamlanan", "Gecikmiş"]
        .map(str::to_string)
        .to_vec();
    ChartSpec::new(ChartKind::Doughnut, "Bakım Durumu", labels).dataset(
        "Bakım",
        vec![
            stats.pending_count,
            stats.completed_this_month,
            stats.overdue_count,
        ],
        [
            chart_colors::WARNING,
            chart_colors::SUCCESS,
            chart_colors::DANGER,
        ]
        .map(str::to_string)
        .to_vec(),
    )
}

pub fn category_distribution(machines: &[Machine]) -> ChartSpec {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for machine in machines {
        let category = machine.category.clone().unwrap_or_else(|| "Diğer".to_string());
        *counts.entry(category).or_default() += 1;
    }
    let labels = counts.keys().map(|c| category_label(c).to_string()).collect();
    let colors = counts.keys().map(|c| category_color(c).to_string()).collect();
    ChartSpec::new(ChartKind::Bar, "Kategori Dağılımı", labels).dataset(
        "Makine Sayısı",
        counts.into_values().collect(),
        colors,
    )
}

pub fn frequency_distribution(schedules: &[MaintenanceSchedule]) -> ChartSpec {
    let (labels, data): (Vec<String>, Vec<u64>) = Frequency::ALL
        .iter()
        .map(|freq| {
            let n = schedules.iter().filter(|s| s.frequency == *freq).count() as u64;
            (freq.label().to_string(), n)
        })
        .filter(|(_, n)| *n > 0)
        .unzip();
    let colors = [
        chart_colors::PRIMARY,
        chart_colors::SECONDARY,
        chart_colors::INFO,
        chart_colors::SUCCESS,
        chart_colors::WARNING,
    ]
    .map(str::to_string)
    .to_vec();
    ChartSpec::new(ChartKind::Pie, "Frekans Dağılımı", labels).dataset("Plan", data, colors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MonthBucket;

    fn machine(category: Option<&str>) -> Machine {
        Machine {
            id: "m".to_string(),
            machine_no: "M-1".to_string(),
            machine_name: "Pres".to_string(),
            category: category.map(str::to_string),
            location: None,
            status: None,
        }
    }

    #[test]
    fn monthly_chart_has_twelve_points_per_series() {
        let mut dist = [MonthBucket::default(); 12];
        dist[2].completed = 4;
        let spec = monthly_distribution(&dist);
        assert_eq!(spec.labels.len(), 12);
        assert_eq!(spec.datasets.len(), 3);
        assert_eq!(spec.datasets[1].data[2], 4);
        assert_eq!(spec.total(), 4);
    }

    #[test]
    fn category_chart_groups_missing_as_other() {
        let spec = category_distribution(&[machine(Some("TD")), machine(None), machine(Some("TD"))]);
        assert_eq!(spec.labels, vec!["Diğer", "Teknik Destek"]);
        assert_eq!(spec.datasets[0].data, vec![1, 2]);
    }

    #[test]
    fn dark_theme_swaps_text_colour() {
        assert_eq!(theme_colors(true).0, "#f3f4f6");
        assert_eq!(theme_colors(false).1, "#e5e7eb");
    }
}

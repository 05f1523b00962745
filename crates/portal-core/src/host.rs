//! Page-side capabilities the views draw into: containers, chart and
//! calendar widgets, downloads, navigation.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

use crate::prefs::Theme;
use crate::widgets::charts::ChartSpec;

pub type ChartId = u64;
pub type WidgetId = u64;

/// One entry handed to the calendar widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub id: String,
    pub title: String,
    pub start: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub trait Host: Send + Sync {
    fn set_html(&self, container: &str, html: &str);

    fn set_active_nav(&self, view: &str);

    fn apply_theme(&self, theme: Theme);

    /// Leaves the page. Used for the login redirect.
    fn redirect(&self, url: &str);

    fn draw_chart(&self, canvas: &str, spec: &ChartSpec) -> ChartId;

    fn destroy_chart(&self, id: ChartId);

    fn update_chart_theme(&self, id: ChartId, dark: bool);

    fn resize_chart(&self, id: ChartId);

    fn mount_calendar(&self, container: &str, entries: &[CalendarEntry]) -> WidgetId;

    fn destroy_widget(&self, id: WidgetId);

    fn resize_widget(&self, id: WidgetId);

    fn download(&self, file: Download);

    fn print(&self, html: &str);

    /// Blocking user notice (alert-style).
    fn notify(&self, message: &str);
}

#[derive(Debug, Clone)]
pub struct LiveChart {
    pub canvas: String,
    pub spec: ChartSpec,
    pub dark: bool,
    pub resizes: usize,
}

#[derive(Debug, Clone)]
pub struct LiveWidget {
    pub container: String,
    pub entries: Vec<CalendarEntry>,
    pub resizes: usize,
}

#[derive(Debug, Default)]
struct Page {
    containers: BTreeMap<String, String>,
    active_nav: Option<String>,
    theme: Theme,
    redirects: Vec<String>,
    next_id: u64,
    charts: BTreeMap<ChartId, LiveChart>,
    widgets: BTreeMap<WidgetId, LiveWidget>,
    downloads: Vec<Download>,
    prints: Vec<String>,
    notices: Vec<String>,
}

/// Records everything drawn into it. Backs the CLI and the tests.
#[derive(Debug, Default)]
pub struct MemoryHost {
    page: Mutex<Page>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(&self, container: &str) -> Option<String> {
        self.page.lock().containers.get(container).cloned()
    }

    pub fn active_nav(&self) -> Option<String> {
        self.page.lock().active_nav.clone()
    }

    pub fn theme(&self) -> Theme {
        self.page.lock().theme
    }

    pub fn redirects(&self) -> Vec<String> {
        self.page.lock().redirects.clone()
    }

    pub fn live_charts(&self) -> Vec<LiveChart> {
        self.page.lock().charts.values().cloned().collect()
    }

    pub fn live_widgets(&self) -> Vec<LiveWidget> {
        self.page.lock().widgets.values().cloned().collect()
    }

    pub fn downloads(&self) -> Vec<Download> {
        self.page.lock().downloads.clone()
    }

    pub fn prints(&self) -> Vec<String> {
        self.page.lock().prints.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.page.lock().notices.clone()
    }

    fn next_id(page: &mut Page) -> u64 {
        page.next_id += 1;
        page.next_id
    }
}

impl Host for MemoryHost {
    fn set_html(&self, container: &str, html: &str) {
        self.page
            .lock()
            .containers
            .insert(container.to_string(), html.to_string());
    }

    fn set_active_nav(&self, view: &str) {
        self.page.lock().active_nav = Some(view.to_string());
    }

    fn apply_theme(&self, theme: Theme) {
        self.page.lock().theme = theme;
    }

    fn redirect(&self, url: &str) {
        self.page.lock().redirects.push(url.to_string());
    }

    fn draw_chart(&self, canvas: &str, spec: &ChartSpec) -> ChartId {
        let mut page = self.page.lock();
        let id = Self::next_id(&mut page);
        let dark = page.theme.is_dark();
        page.charts.insert(
            id,
            LiveChart {
                canvas: canvas.to_string(),
                spec: spec.clone(),
                dark,
                resizes: 0,
            },
        );
        id
    }

    fn destroy_chart(&self, id: ChartId) {
        self.page.lock().charts.remove(&id);
    }

    fn update_chart_theme(&self, id: ChartId, dark: bool) {
        if let Some(chart) = self.page.lock().charts.get_mut(&id) {
            chart.dark = dark;
        }
    }

    fn resize_chart(&self, id: ChartId) {
        if let Some(chart) = self.page.lock().charts.get_mut(&id) {
            chart.resizes += 1;
        }
    }

    fn mount_calendar(&self, container: &str, entries: &[CalendarEntry]) -> WidgetId {
        let mut page = self.page.lock();
        let id = Self::next_id(&mut page);
        page.widgets.insert(
            id,
            LiveWidget {
                container: container.to_string(),
                entries: entries.to_vec(),
                resizes: 0,
            },
        );
        id
    }

    fn destroy_widget(&self, id: WidgetId) {
        self.page.lock().widgets.remove(&id);
    }

    fn resize_widget(&self, id: WidgetId) {
        if let Some(widget) = self.page.lock().widgets.get_mut(&id) {
            widget.resizes += 1;
        }
    }

    fn download(&self, file: Download) {
        self.page.lock().downloads.push(file);
    }

    fn print(&self, html: &str) {
        self.page.lock().prints.push(html.to_string());
    }

    fn notify(&self, message: &str) {
        self.page.lock().notices.push(message.to_string());
    }
}

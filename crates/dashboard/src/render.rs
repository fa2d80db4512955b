//! HTML pages and inline SVG line charts.

use crate::views::{Chart, CompareView, Panel, PredictOutcome, PredictView, TrendsView};
use chrono::NaiveDate;
use std::fmt::Write as _;
use stockcast_core::catalog;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 360.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 50.0;
const PALETTE: [&str; 4] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728"];

const STYLE: &str = r#"
body { margin: 0; font-family: sans-serif; display: flex; }
nav { background-color: #202A44; color: white; min-height: 100vh; width: 240px; padding: 16px; }
nav h2 { color: white; }
nav a { color: white; display: block; margin: 8px 0; }
nav a.active { font-weight: bold; }
main { padding: 24px; flex: 1; }
form label { display: block; margin: 8px 0; }
.warning { background: #fff4d6; padding: 8px 12px; }
.error { background: #fde2e1; padding: 8px 12px; }
.success { background: #e3f6e5; padding: 8px 12px; }
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    Predict,
    Trends,
    Compare,
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn layout(title: &str, active: Page, sidebar_extra: &str, body: &str) -> String {
    let link = |page: Page, href: &str, label: &str| {
        let class = if page == active { " class=\"active\"" } else { "" };
        format!("<a href=\"{href}\"{class}>{label}</a>")
    };

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title><style>{STYLE}</style></head>\
         <body><nav><h2>Choose Your Task</h2>{}{}{}{sidebar_extra}</nav><main>{body}</main></body></html>",
        link(Page::Predict, "/predict", "Predict Future Stock Price"),
        link(Page::Trends, "/trends", "Stock Trends Exploration"),
        link(Page::Compare, "/compare", "Compare Stocks"),
        title = escape(title),
    )
}

pub fn home_page() -> String {
    layout("STOCK MARKET ANALYSIS", Page::Home, "", "<h1>STOCK MARKET ANALYSIS</h1>")
}

pub fn message(class: &str, text: &str) -> String {
    format!("<p class=\"{class}\">{}</p>", escape(text))
}

fn symbol_select(name: &str, label: &str, selected: Option<&str>) -> String {
    let mut out = format!(
        "<label>{} <select name=\"{name}\"><option value=\"\">Choose an option</option>",
        escape(label)
    );
    for c in catalog::companies() {
        let sel = if selected.is_some_and(|s| s.eq_ignore_ascii_case(c.symbol)) {
            " selected"
        } else {
            ""
        };
        let _ = write!(out, "<option value=\"{0}\"{sel}>{0}</option>", c.symbol);
    }
    out.push_str("</select></label>");
    out
}

fn date_input(name: &str, label: &str, value: Option<&str>) -> String {
    format!(
        "<label>{} <input type=\"date\" name=\"{name}\" value=\"{}\"></label>",
        escape(label),
        escape(value.unwrap_or(""))
    )
}

/// Form fields kept by the trend and comparison pages.
#[derive(Debug, Clone, Default)]
pub struct FormState<'a> {
    pub symbol: Option<&'a str>,
    pub second_symbol: Option<&'a str>,
    pub start_date: Option<&'a str>,
    pub end_date: Option<&'a str>,
    pub date: Option<&'a str>,
}

pub fn trends_page(form: &FormState<'_>, content: &str) -> String {
    let body = format!(
        "<form method=\"get\" action=\"/trends\"><h2>Details:</h2>{}{}{}<button>Show</button></form>{content}",
        date_input("start_date", "Start Date", form.start_date),
        date_input("end_date", "End Date", form.end_date),
        symbol_select("symbol", "Stock Symbol", form.symbol),
    );
    layout("Stock Trends Exploration", Page::Trends, "", &body)
}

pub fn trends_content(view: &TrendsView) -> String {
    let name = escape(view.company.name);
    let mut out = format!("<h1>{name} Forecasted Stock Market</h1>");
    out.push_str(&panels(&view.forecasts));
    let _ = write!(out, "<h1>{name} History</h1>");
    out.push_str(&panels(&view.history));
    out
}

pub fn predict_page(form: &FormState<'_>, min_date: NaiveDate, content: &str) -> String {
    let body = format!(
        "<h1>Predict Future Stock Price</h1><form method=\"get\" action=\"/predict\">\
         <label>Select a future date <input type=\"date\" name=\"date\" min=\"{min_date}\" value=\"{}\"></label>\
         {}<button>Predict</button></form>{content}",
        escape(form.date.unwrap_or(&min_date.to_string())),
        symbol_select("symbol", "Select a stock", form.symbol),
    );
    layout("Predict Future Stock Price", Page::Predict, "", &body)
}

pub fn predict_content(view: &PredictView) -> String {
    match &view.outcome {
        PredictOutcome::Available { .. } => {
            let Some((heading, lines)) = view.lines() else {
                return String::new();
            };
            let mut out = format!("<p class=\"success\"><strong>{}</strong></p>", escape(&heading));
            for line in lines {
                // Value after the label is emphasized.
                match line.split_once(": ") {
                    Some((label, value)) => {
                        let _ = write!(
                            out,
                            "<p>{}: <strong>{}</strong></p>",
                            escape(label),
                            escape(value)
                        );
                    }
                    None => out.push_str(&message("", &line)),
                }
            }
            out
        }
        PredictOutcome::Unavailable { message: text } => message("warning", text),
        PredictOutcome::ModelMissing { message: text } => message("error", text),
    }
}

pub fn compare_page(form: &FormState<'_>, max_date: NaiveDate, content: &str) -> String {
    let sidebar = format!(
        "<form method=\"get\" action=\"/compare\" id=\"compare\">{}\
         <label>End Date <input type=\"date\" name=\"end_date\" max=\"{max_date}\" value=\"{}\"></label></form>",
        date_input("start_date", "Start Date", form.start_date),
        escape(form.end_date.unwrap_or("")),
    );
    let body = format!(
        "<h1>Compare Stock Prices</h1><div>{}{}<button form=\"compare\">Compare</button></div>{content}",
        symbol_select_for_form("stock1", "Select the first stock", form.symbol),
        symbol_select_for_form("stock2", "Select the second stock", form.second_symbol),
    );
    layout("Compare Stock Prices", Page::Compare, &sidebar, &body)
}

// Selects live in <main> but submit with the sidebar form.
fn symbol_select_for_form(name: &str, label: &str, selected: Option<&str>) -> String {
    symbol_select(name, label, selected).replacen("<select ", "<select form=\"compare\" ", 1)
}

pub fn compare_content(view: &CompareView) -> String {
    panels(&view.panels)
}

fn panels(panels: &[Panel]) -> String {
    let mut out = String::new();
    for panel in panels {
        match panel {
            Panel::Chart(chart) => out.push_str(&line_chart(chart)),
            Panel::Warning { message: text } => out.push_str(&message("warning", text)),
            Panel::Error { message: text } => out.push_str(&message("error", text)),
        }
    }
    out
}

/// Renders every series of `chart` as a polyline on shared axes.
pub fn line_chart(chart: &Chart) -> String {
    let mut out = format!(
        "<figure><svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{CHART_WIDTH}\" height=\"{CHART_HEIGHT}\" \
         viewBox=\"0 0 {CHART_WIDTH} {CHART_HEIGHT}\" role=\"img\">\
         <text x=\"{}\" y=\"20\" text-anchor=\"middle\" font-size=\"16\">{}</text>",
        CHART_WIDTH / 2.0,
        escape(&chart.title)
    );

    let points = chart.series.iter().flat_map(|s| s.points.iter());
    let bounds = points.fold(None, |acc: Option<(i32, i32, f64, f64)>, (d, v)| {
        let x = day_number(*d);
        Some(match acc {
            None => (x, x, *v, *v),
            Some((x0, x1, y0, y1)) => (x0.min(x), x1.max(x), y0.min(*v), y1.max(*v)),
        })
    });

    let Some((x_min, x_max, y_min, y_max)) = bounds else {
        let _ = write!(
            out,
            "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\">No data</text></svg></figure>",
            CHART_WIDTH / 2.0,
            CHART_HEIGHT / 2.0
        );
        return out;
    };

    let plot_w = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x_span = f64::from((x_max - x_min).max(1));
    let y_span = if y_max > y_min { y_max - y_min } else { 1.0 };
    let sx = |d: NaiveDate| MARGIN_LEFT + f64::from(day_number(d) - x_min) / x_span * plot_w;
    let sy = |v: f64| MARGIN_TOP + plot_h - (v - y_min) / y_span * plot_h;

    let bottom = MARGIN_TOP + plot_h;
    let right = MARGIN_LEFT + plot_w;
    let _ = write!(
        out,
        "<line x1=\"{MARGIN_LEFT}\" y1=\"{bottom}\" x2=\"{right}\" y2=\"{bottom}\" stroke=\"#888\"/>\
         <line x1=\"{MARGIN_LEFT}\" y1=\"{MARGIN_TOP}\" x2=\"{MARGIN_LEFT}\" y2=\"{bottom}\" stroke=\"#888\"/>"
    );

    for v in [y_min, (y_min + y_max) / 2.0, y_max] {
        let _ = write!(
            out,
            "<text x=\"{}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"11\">{}</text>",
            MARGIN_LEFT - 6.0,
            sy(v) + 4.0,
            axis_number(v)
        );
    }

    let first = NaiveDate::from_num_days_from_ce_opt(x_min);
    let last = NaiveDate::from_num_days_from_ce_opt(x_max);
    if let (Some(first), Some(last)) = (first, last) {
        let _ = write!(
            out,
            "<text x=\"{MARGIN_LEFT}\" y=\"{}\" font-size=\"11\">{first}</text>\
             <text x=\"{right}\" y=\"{}\" text-anchor=\"end\" font-size=\"11\">{last}</text>",
            bottom + 16.0,
            bottom + 16.0
        );
    }
    let _ = write!(
        out,
        "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-size=\"12\">{}</text>\
         <text x=\"14\" y=\"{}\" text-anchor=\"middle\" font-size=\"12\" transform=\"rotate(-90 14 {})\">{}</text>",
        MARGIN_LEFT + plot_w / 2.0,
        CHART_HEIGHT - 8.0,
        escape(&chart.x_label),
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0,
        escape(&chart.y_label)
    );

    for (i, series) in chart.series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let coords: Vec<String> = series
            .points
            .iter()
            .map(|(d, v)| format!("{:.1},{:.1}", sx(*d), sy(*v)))
            .collect();
        let _ = write!(
            out,
            "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"1.5\" points=\"{}\"/>\
             <text x=\"{}\" y=\"{}\" fill=\"{color}\" font-size=\"12\">{}</text>",
            coords.join(" "),
            MARGIN_LEFT + 8.0,
            MARGIN_TOP + 14.0 * (i as f64 + 1.0),
            escape(&series.label)
        );
    }

    out.push_str("</svg></figure>");
    out
}

fn day_number(d: NaiveDate) -> i32 {
    use chrono::Datelike;
    d.num_days_from_ce()
}

fn axis_number(v: f64) -> String {
    if v.abs() >= 1.0e6 {
        format!("{:.1}M", v / 1.0e6)
    } else {
        format!("{v:.2}")
    }
}

use std::fmt::Write;

use anyhow::Context;
use serde::Serialize;

use crate::models::{ClassifiedPoint, Color, Shape, StatisticsSummary};
use crate::popup::escape_html;

/// Map center used when no point survives classification (Paraguay).
pub const DEFAULT_CENTER: (f64, f64) = (-23.4425, -58.4438);
pub const DEFAULT_ZOOM: u8 = 6;
const ICON_SIZE: u32 = 24;

const PAGE_STYLE: &str = r#"
html, body, #map { height: 100%; margin: 0; }
.popup-content { font-family: Arial, sans-serif; font-size: 13px; line-height: 1.4; width: 280px; }
.popup-content h4 { margin: 5px 0 10px; color: #1f77b4; text-align: center; }
.popup-content p { margin: 2px 0; }
.popup-content strong { color: #333; }
.popup-content hr { border: 0; height: 1px; background: #999; margin: 10px 0; }
.hidden-content { display: none; max-height: 200px; overflow-y: auto; border-top: 1px dashed #ccc; padding-top: 5px; margin-top: 5px; }
.toggle-button { background-color: #007bff; border: none; color: white; padding: 5px 10px; font-size: 12px; margin-top: 10px; cursor: pointer; border-radius: 4px; width: 100%; }
.toggle-button:hover { background-color: #0056b3; }
.stats-panel { position: absolute; top: 10px; right: 10px; z-index: 1000; background: white; padding: 8px 12px; border-radius: 5px; font-family: Arial, sans-serif; font-size: 12px; box-shadow: 0 0 5px rgba(0,0,0,0.4); }
.stats-panel h5 { margin: 6px 0 2px; }
"#;

// Installed once for the whole page; popups only carry data-target-id.
const TOGGLE_SCRIPT: &str = r#"
document.body.addEventListener('click', function (event) {
  var button = event.target.closest ? event.target.closest('.toggle-button') : null;
  if (!button) { return; }
  var target = document.getElementById(button.getAttribute('data-target-id'));
  if (!target) { return; }
  var hidden = target.style.display === 'none' || target.style.display === '';
  target.style.display = hidden ? 'block' : 'none';
  button.setAttribute('aria-expanded', hidden ? 'true' : 'false');
});
"#;

const MARKER_SCRIPT: &str = r#"
var map = L.map('map').setView([__CENTER_LAT__, __CENTER_LON__], __ZOOM__);
L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);
var cluster = L.markerClusterGroup();
__POINTS__.forEach(function (point) {
  var icon = L.divIcon({ html: point.icon, className: '', iconSize: [__ICON__, __ICON__], iconAnchor: [__ANCHOR__, __ANCHOR__] });
  L.marker([point.lat, point.lon], { icon: icon }).bindPopup(point.popup, { maxWidth: 300 }).addTo(cluster);
});
map.addLayer(cluster);
"#;

#[derive(Debug, Serialize)]
struct Marker<'a> {
    lat: f64,
    lon: f64,
    icon: String,
    popup: &'a str,
}

/// Arithmetic mean of all coordinates, or [`DEFAULT_CENTER`] when empty.
pub fn map_center(points: &[ClassifiedPoint]) -> (f64, f64) {
    if points.is_empty() {
        return DEFAULT_CENTER;
    }
    let count = points.len() as f64;
    let latitude: f64 = points.iter().map(|point| point.latitude).sum();
    let longitude: f64 = points.iter().map(|point| point.longitude).sum();
    (latitude / count, longitude / count)
}

pub fn marker_icon_html(shape: Shape, color: Color, label: char) -> String {
    let label = escape_html(&label.to_string());
    let color = color.as_str();
    match shape {
        Shape::Circle => format!(
            "<div style=\"width:{ICON_SIZE}px;height:{ICON_SIZE}px;background-color:{color};\
             border-radius:50%;border:1px solid white;display:flex;align-items:center;\
             justify-content:center;font-size:12px;font-weight:bold;color:white;line-height:1;\">\
             {label}</div>"
        ),
        Shape::Diamond => format!(
            "<div style=\"width:{ICON_SIZE}px;height:{ICON_SIZE}px;background-color:{color};\
             border-radius:4px;transform:rotate(45deg);display:flex;align-items:center;\
             justify-content:center;border:2px solid white;box-shadow:0 0 5px rgba(0,0,0,0.5);\
             font-family:Arial,sans-serif;font-size:14px;font-weight:bold;color:white;\">\
             <span style=\"transform:rotate(-45deg);display:inline-block;line-height:1;\">\
             {label}</span></div>"
        ),
    }
}

/// Serializes markers for inline embedding; `</` is escaped so popup markup
/// cannot close the surrounding script element.
fn markers_json(points: &[ClassifiedPoint]) -> anyhow::Result<String> {
    let markers: Vec<Marker<'_>> = points
        .iter()
        .map(|point| Marker {
            lat: point.latitude,
            lon: point.longitude,
            icon: marker_icon_html(point.shape, point.color, point.label_letter),
            popup: &point.popup_html,
        })
        .collect();
    let json = serde_json::to_string(&markers).context("failed to serialize map markers")?;
    Ok(json.replace("</", "<\\/"))
}

fn stats_panel(stats: &StatisticsSummary) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<div class='stats-panel'><strong>Total customers: {}</strong>",
        stats.total_customers
    );
    for (shape, title, total) in [
        (Shape::Circle, "Circles (nothing in transit)", stats.total_circles),
        (Shape::Diamond, "Diamonds (merchandise in transit)", stats.total_diamonds),
    ] {
        let _ = write!(html, "<h5>{title}: {total}</h5>");
        for color in Color::ALL {
            let _ = write!(
                html,
                "<div>{}: {}</div>",
                color.as_str(),
                stats.count(shape, color)
            );
        }
    }
    let _ = write!(html, "</div>");
    html
}

/// Renders a standalone Leaflet page: clustered markers, one popup per
/// point, a global stylesheet and a single delegated toggle handler.
pub fn render_map_document(
    points: &[ClassifiedPoint],
    stats: &StatisticsSummary,
) -> anyhow::Result<String> {
    let (center_lat, center_lon) = map_center(points);
    let anchor = ICON_SIZE / 2;
    let markers = MARKER_SCRIPT
        .replace("__CENTER_LAT__", &center_lat.to_string())
        .replace("__CENTER_LON__", &center_lon.to_string())
        .replace("__ZOOM__", &DEFAULT_ZOOM.to_string())
        .replace("__ICON__", &ICON_SIZE.to_string())
        .replace("__ANCHOR__", &anchor.to_string())
        .replace("__POINTS__", &markers_json(points)?);

    let mut output = String::new();
    let _ = writeln!(output, "<!DOCTYPE html>");
    let _ = writeln!(output, "<html><head><meta charset=\"utf-8\">");
    let _ = writeln!(output, "<title>Sales point map</title>");
    let _ = writeln!(
        output,
        "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet@1.9.4/dist/leaflet.css\">"
    );
    let _ = writeln!(
        output,
        "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css\">"
    );
    let _ = writeln!(
        output,
        "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css\">"
    );
    let _ = writeln!(output, "<style>{PAGE_STYLE}</style>");
    let _ = writeln!(output, "</head><body>");
    let _ = writeln!(output, "<div id=\"map\"></div>");
    let _ = writeln!(output, "{}", stats_panel(stats));
    let _ = writeln!(
        output,
        "<script src=\"https://unpkg.com/leaflet@1.9.4/dist/leaflet.js\"></script>"
    );
    let _ = writeln!(
        output,
        "<script src=\"https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js\"></script>"
    );
    let _ = writeln!(output, "<script>{markers}</script>");
    let _ = writeln!(output, "<script>{TOGGLE_SCRIPT}</script>");
    let _ = writeln!(output, "</body></html>");

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SaleAttributes;
    use crate::stats::summarize;

    fn point(customer_id: i64, latitude: f64, longitude: f64, shape: Shape) -> ClassifiedPoint {
        ClassifiedPoint {
            customer_id,
            customer_name: format!("Customer {customer_id}"),
            latitude,
            longitude,
            latest_reference_date: None,
            attributes: SaleAttributes::default(),
            color: Color::Orange,
            shape,
            label_letter: 'B',
            popup_html: format!(
                "<div class='popup-content'><button class='toggle-button' \
                 data-target-id='movements-{customer_id}'>x</button></div>"
            ),
        }
    }

    #[test]
    fn center_is_mean_of_coordinates() {
        let points = vec![
            point(1, -24.0, -56.0, Shape::Circle),
            point(2, -26.0, -58.0, Shape::Diamond),
        ];
        assert_eq!(map_center(&points), (-25.0, -57.0));
    }

    #[test]
    fn empty_map_uses_default_center() {
        assert_eq!(map_center(&[]), DEFAULT_CENTER);
        let html = render_map_document(&[], &summarize(&[])).unwrap();
        assert!(html.contains("setView([-23.4425, -58.4438], 6)"));
        assert!(html.contains("Total customers: 0"));
    }

    #[test]
    fn icons_follow_shape_and_color() {
        let circle = marker_icon_html(Shape::Circle, Color::Green, 'A');
        let diamond = marker_icon_html(Shape::Diamond, Color::Red, 'Z');
        assert!(circle.contains("border-radius:50%") && circle.contains("background-color:green"));
        assert!(diamond.contains("rotate(45deg)") && diamond.contains("background-color:red"));
        assert!(diamond.contains(">Z</span>"));
    }

    #[test]
    fn toggle_handler_is_installed_once() {
        let points: Vec<_> = (0..50)
            .map(|id| point(id, -25.0, -57.0, Shape::Diamond))
            .collect();
        let html = render_map_document(&points, &summarize(&points)).unwrap();
        assert_eq!(html.matches("addEventListener('click'").count(), 1);
        assert_eq!(html.matches("data-target-id='movements-").count(), 50);
        assert!(html.contains("L.markerClusterGroup()"));
    }

    #[test]
    fn popup_markup_cannot_close_the_script_element() {
        let mut sneaky = point(1, -25.0, -57.0, Shape::Circle);
        sneaky.popup_html = "<p></script><script>alert(1)</p>".to_string();
        let html = render_map_document(&[sneaky], &summarize(&[])).unwrap();
        assert!(!html.contains("</script><script>alert"));
    }
}

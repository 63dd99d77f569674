//! Map initialization script embedded in the report
//!
//! The script draws the markers, tracks tile loading with a pending counter
//! and finally raises exactly one of the two completion flags.

use super::{ERROR_FLAG, READY_FLAG};
use crate::grid::GridData;
use crate::model::RenderOptions;
use crate::palette;
use crate::{Error, Result};

pub const MAP_ZOOM: u32 = 12;
pub const FIT_PADDING_PX: u32 = 50;
pub const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

const SCRIPT: &str = r#"
(function () {
  function fail(err) {
    window.{{ERROR_FLAG}} = (err && err.message) ? err.message : String(err);
  }

  window.addEventListener('DOMContentLoaded', function () {
    try {
      if (typeof L === 'undefined') {
        throw new Error('Map library failed to load');
      }

      var map = L.map('map', { zoomControl: true, attributionControl: true, preferCanvas: true });
      map.setView([{{CENTER_LAT}}, {{CENTER_LNG}}], {{ZOOM}});

      var tiles = { pending: 0, settled: true };
      var layer = L.tileLayer({{TILE_URL}}, {
        attribution: '&copy; OpenStreetMap contributors',
        maxZoom: 19,
        minZoom: 1
      });
      layer.on('loading', function () {
        tiles.pending += 1;
        tiles.settled = false;
      });
      layer.on('load', function () {
        tiles.pending = Math.max(0, tiles.pending - 1);
        tiles.settled = tiles.pending === 0;
      });
      layer.on('tileerror', function (e) {
        console.warn('Tile load error', e && e.coords);
      });
      layer.addTo(map);

      var points = {{POINTS}};
      points.forEach(function (point) {
        var html = '<div class="custom-marker" style="' +
          'width: {{MARKER}}px; height: {{MARKER}}px; line-height: {{MARKER}}px; ' +
          'background-color: ' + point.color + '; color: ' + point.textColor + ';">' +
          point.displayText + '</div>';
        var icon = L.divIcon({
          html: html,
          className: '',
          iconSize: [{{MARKER}}, {{MARKER}}],
          iconAnchor: [{{MARKER_HALF}}, {{MARKER_HALF}}]
        });
        var status = point.position !== null ? 'Position: #' + point.position : 'Not found';
        L.marker([point.lat, point.lng], { icon: icon }).addTo(map).bindPopup(
          '<strong>Point ' + (point.index + 1) + '</strong><br>' + status + '<br>' +
          'Lat: ' + point.lat.toFixed(6) + '<br>Lng: ' + point.lng.toFixed(6)
        );
      });

      var centerColor = {{CENTER_COLOR}};
      var businessHtml = '<div class="custom-marker business-marker" style="' +
        'width: {{BUSINESS}}px; height: {{BUSINESS}}px; ' +
        'background-color: ' + centerColor + '; color: ' + {{CENTER_TEXT_COLOR}} + '; ' +
        'border: 3px solid #ffffff; box-shadow: 0 2px 8px rgba(0,0,0,0.3); position: relative; ' +
        'font-weight: bold; font-size: {{BUSINESS_FONT}}px;">' + {{CENTER_LABEL}} +
        '<div style="position: absolute; bottom: -11px; left: 50%; transform: translateX(-50%); ' +
        'width: 0; height: 0; border-left: 8px solid transparent; border-right: 8px solid transparent; ' +
        'border-top: 12px solid ' + centerColor + ';"></div></div>';
      var businessIcon = L.divIcon({
        html: businessHtml,
        className: '',
        iconSize: [{{BUSINESS}}, {{BUSINESS}}],
        iconAnchor: [{{BUSINESS_HALF}}, {{BUSINESS_HALF}}]
      });
      L.marker([{{CENTER_LAT}}, {{CENTER_LNG}}], { icon: businessIcon, zIndexOffset: 1000 })
        .addTo(map)
        .bindPopup('<strong>Business location</strong><br>Position: ' + {{CENTER_LABEL}});

      map.fitBounds(
        L.latLngBounds([{{SOUTH}}, {{WEST}}], [{{NORTH}}, {{EAST}}]),
        { padding: [{{PADDING}}, {{PADDING}}] }
      );

      function settle() {
        if (tiles.settled || tiles.pending === 0) {
          window.{{READY_FLAG}} = true;
        } else {
          setTimeout(settle, 100);
        }
      }
      setTimeout(settle, 500);
    } catch (err) {
      console.error('Error initializing map:', err);
      fail(err);
    }
  });
})();
"#;

fn js_string(value: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("Failed to encode script string: {}", e)))
}

/// Render the script for a grid
///
/// # Errors
///
/// Serialization failures are internal errors.
pub fn map_script(grid: &GridData, options: &RenderOptions) -> Result<String> {
    let points = serde_json::to_string(&grid.points)
        .map_err(|e| Error::Internal(format!("Failed to serialize grid points: {}", e)))?
        // keep the payload from closing the surrounding <script> element
        .replace("</", "<\\/");

    let center_position = grid.center_point().and_then(|p| p.position);
    let center_style = palette::style_for(center_position);

    let marker = options.marker_size;
    let business = marker + 8;

    Ok(SCRIPT
        .replace("{{ERROR_FLAG}}", ERROR_FLAG)
        .replace("{{READY_FLAG}}", READY_FLAG)
        .replace("{{CENTER_LAT}}", &grid.center.lat.to_string())
        .replace("{{CENTER_LNG}}", &grid.center.lng.to_string())
        .replace("{{ZOOM}}", &MAP_ZOOM.to_string())
        .replace("{{TILE_URL}}", &js_string(TILE_URL)?)
        .replace("{{POINTS}}", &points)
        .replace("{{MARKER_HALF}}", &(f64::from(marker) / 2.0).to_string())
        .replace("{{MARKER}}", &marker.to_string())
        .replace("{{BUSINESS_HALF}}", &(f64::from(business) / 2.0).to_string())
        .replace("{{BUSINESS_FONT}}", &((marker * 4) / 10).to_string())
        .replace("{{BUSINESS}}", &business.to_string())
        .replace("{{CENTER_COLOR}}", &js_string(center_style.color)?)
        .replace("{{CENTER_TEXT_COLOR}}", &js_string(center_style.text_color)?)
        .replace("{{CENTER_LABEL}}", &js_string(&palette::marker_label(center_position))?)
        .replace("{{SOUTH}}", &grid.bounds.south.to_string())
        .replace("{{WEST}}", &grid.bounds.west.to_string())
        .replace("{{NORTH}}", &grid.bounds.north.to_string())
        .replace("{{EAST}}", &grid.bounds.east.to_string())
        .replace("{{PADDING}}", &FIT_PADDING_PX.to_string()))
}

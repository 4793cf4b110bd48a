// cluster_iostat - Cluster iostat capture, collection & plotting
// Copyright (C) 2024 Laurence Oberman
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

/*!
    # plot.rs

    Renders one metric of a parsed iostat table as a time series chart.

    - One line series per chart, metric against sample time
    - X axis is seconds since the first sample, labelled as clock time
    - SVG (default) or PNG, same 900x300 layout either way
*/

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use clap::ValueEnum;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::PlotError;
use crate::iostat::{Column, SeriesTable};
use crate::metric::Metric;

const SIZE: (u32, u32) = (900, 300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PlotFormat {
    #[default]
    Svg,
    Png,
}

impl PlotFormat {
    pub const ALL: [PlotFormat; 2] = [PlotFormat::Svg, PlotFormat::Png];

    pub fn extension(self) -> &'static str {
        match self {
            PlotFormat::Svg => "svg",
            PlotFormat::Png => "png",
        }
    }
}

/// Everything the chart needs, computed once for either backend.
struct ChartData<'a> {
    title: String,
    metric: Metric,
    start: NaiveDateTime,
    xs: Vec<f64>,
    values: &'a [f64],
    x_range: (f64, f64),
    y_range: (f64, f64),
    label_format: &'static str,
}

impl<'a> ChartData<'a> {
    fn new(table: &'a SeriesTable, metric: Metric, title: String) -> Result<Self, PlotError> {
        let times = table.timestamps();
        let start = *times.first().ok_or(PlotError::NoData)?;
        let xs: Vec<f64> = times
            .iter()
            .map(|t| (*t - start).num_milliseconds() as f64 / 1000.0)
            .collect();
        let values = match table.column(metric.column()) {
            Some(Column::Values(values)) => values,
            _ => return Err(PlotError::NoData),
        };

        let x_min = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let mut x_max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if x_max <= x_min {
            x_max = x_min + 1.0;
        }
        let y_min = values.iter().copied().fold(f64::INFINITY, f64::min).min(0.0);
        let y_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(1.0);

        // Date only matters once the capture spans more than a day.
        let label_format = if x_max - x_min > 86_400.0 {
            "%m/%d %H:%M"
        } else {
            "%H:%M:%S"
        };

        Ok(Self {
            title,
            metric,
            start,
            xs,
            values,
            x_range: (x_min, x_max),
            y_range: (y_min, y_max * 1.05),
            label_format,
        })
    }

    fn time_label(&self, x: f64) -> String {
        (self.start + Duration::milliseconds((x * 1000.0).round() as i64))
            .format(self.label_format)
            .to_string()
    }
}

/// Appends `.ext` without touching dots already in the name.
fn with_added_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Draws `metric` against time into `{base}.{ext}` and returns the path.
///
/// The drawing backend lives only for the duration of the call and is
/// flushed before returning, so consecutive plots share no state.
pub fn plot(
    table: &SeriesTable,
    base: &Path,
    metric: Metric,
    format: PlotFormat,
) -> Result<PathBuf, PlotError> {
    let title = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let data = ChartData::new(table, metric, format!("{title} - {}", metric.label()))?;
    let path = with_added_extension(base, format.extension());

    let drawn = match format {
        PlotFormat::Svg => draw(SVGBackend::new(&path, SIZE).into_drawing_area(), &data),
        PlotFormat::Png => draw(BitMapBackend::new(&path, SIZE).into_drawing_area(), &data),
    };
    drawn.map_err(|reason| PlotError::Draw {
        path: path.clone(),
        reason,
    })?;
    Ok(path)
}

fn draw<DB: DrawingBackend>(root: DrawingArea<DB, Shift>, data: &ChartData) -> Result<(), String> {
    let err = |e: DrawingAreaErrorKind<DB::ErrorType>| e.to_string();

    root.fill(&WHITE).map_err(err)?;
    let (x_min, x_max) = data.x_range;
    let (y_min, y_max) = data.y_range;
    let mut chart = ChartBuilder::on(&root)
        .caption(&data.title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(err)?;
    chart
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&|x| data.time_label(*x))
        .x_desc("Time")
        .y_desc(data.metric.description())
        .draw()
        .map_err(err)?;
    chart
        .draw_series(LineSeries::new(
            data.xs.iter().copied().zip(data.values.iter().copied()),
            &BLUE,
        ))
        .map_err(err)?;
    root.present().map_err(err)?;
    Ok(())
}

//! Output writers.
//!
//! Single-realization runs write one JSON document per day; batch runs
//! append per-node and per-network CSV rows keyed by `sim_id` and `day`,
//! plus a wall-time file per batch.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;

use crate::model::{Network, Node, RiskGroup, Stratum, VaccineGroup};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not serialize day report: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> OutputError + '_ {
    move |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Per-node report: named compartment totals plus the full
/// `compartment -> risk -> vaccine -> [per-age]` breakdown.
fn node_report(node: &Node, network: &Network) -> serde_json::Value {
    let set = network.compartment_set();
    let summary: serde_json::Map<String, serde_json::Value> = node
        .compartments
        .compartment_summary(set)
        .into_iter()
        .map(|(label, value)| (label, json!(value)))
        .collect();

    let mut subgroups = serde_json::Map::new();
    for (c, label) in set.labels().iter().enumerate() {
        let mut by_risk = serde_json::Map::new();
        for risk in RiskGroup::ALL {
            let mut by_vaccine = serde_json::Map::new();
            for vaccine in VaccineGroup::ALL {
                let ages: Vec<f64> = (0..node.compartments.num_age_groups())
                    .map(|age| {
                        node.compartments
                            .get(Stratum::new(age, risk, vaccine), c)
                    })
                    .collect();
                by_vaccine.insert(vaccine.label().to_string(), json!(ages));
            }
            by_risk.insert(risk.label().to_string(), json!(by_vaccine));
        }
        subgroups.insert(label.clone(), json!(by_risk));
    }

    json!({
        "node_index": node.node_index,
        "node_id": node.node_id,
        "fips_id": node.fips_id,
        "compartment_summary": summary,
        "compartment_subgroups": subgroups,
    })
}

/// Append one CSV record, writing the header first when the file is new or
/// empty.
fn append_csv_row(path: &Path, header: &[String], row: &[String]) -> Result<(), OutputError> {
    let write_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    let mut writer = csv::Writer::from_writer(file);
    if write_header {
        writer.write_record(header).map_err(|e| OutputError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
    }
    writer.write_record(row).map_err(|e| OutputError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;
    writer.flush().map_err(io_err(path))?;
    Ok(())
}

/// Day-by-day output sink for one run.
pub enum Writer {
    Json { output_dir: PathBuf },
    Csv { output_dir: PathBuf, batch_num: usize },
}

impl Writer {
    /// JSON mode for a single realization, CSV mode for batches.
    pub fn new(
        output_dir: &Path,
        total_realizations: usize,
        batch_num: usize,
    ) -> Result<Self, OutputError> {
        fs::create_dir_all(output_dir).map_err(io_err(output_dir))?;
        if total_realizations == 1 {
            Ok(Writer::Json {
                output_dir: output_dir.to_path_buf(),
            })
        } else {
            Ok(Writer::Csv {
                output_dir: output_dir.to_path_buf(),
                batch_num,
            })
        }
    }

    /// Write one day of network state.
    pub fn write(
        &self,
        sim_id: usize,
        day: usize,
        network: &Network,
    ) -> Result<(), OutputError> {
        match self {
            Writer::Json { output_dir } => Self::write_json(output_dir, sim_id, day, network),
            Writer::Csv {
                output_dir,
                batch_num,
            } => Self::write_csv(output_dir, *batch_num, sim_id, day, network),
        }
    }

    fn write_json(
        output_dir: &Path,
        sim_id: usize,
        day: usize,
        network: &Network,
    ) -> Result<(), OutputError> {
        let set = network.compartment_set();
        let mut total_summary: serde_json::Map<String, serde_json::Value> = set
            .labels()
            .iter()
            .map(|label| (label.clone(), json!(0.0)))
            .collect();
        let mut data = Vec::with_capacity(network.num_nodes());
        for node in &network.nodes {
            for (label, value) in node.compartments.compartment_summary(set) {
                let slot = total_summary.get_mut(&label).unwrap();
                *slot = json!(slot.as_f64().unwrap() + value);
            }
            data.push(node_report(node, network));
        }
        let report = json!({
            "day": day,
            "reports": [],
            "data": data,
            "total_summary": total_summary,
        });

        let sim_dir = output_dir.join(format!("output_sim{sim_id}"));
        fs::create_dir_all(&sim_dir).map_err(io_err(&sim_dir))?;
        let path = sim_dir.join(format!("output_{day}.json"));
        let file = File::create(&path).map_err(io_err(&path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush().map_err(io_err(&path))?;
        Ok(())
    }

    fn write_csv(
        output_dir: &Path,
        batch_num: usize,
        sim_id: usize,
        day: usize,
        network: &Network,
    ) -> Result<(), OutputError> {
        let set = network.compartment_set();
        let labels = set.labels();
        let ages = network.num_age_groups();

        let mut subgroup_columns = Vec::new();
        for label in labels {
            for risk in RiskGroup::ALL {
                for vaccine in VaccineGroup::ALL {
                    for age in 0..ages {
                        subgroup_columns.push(format!(
                            "{label}_{}_{}_age{age}",
                            risk.label(),
                            vaccine.label()
                        ));
                    }
                }
            }
        }
        let mut node_header: Vec<String> =
            ["sim_id", "day", "node_index", "node_id", "fips_id"]
                .into_iter()
                .map(String::from)
                .collect();
        node_header.extend(labels.iter().cloned());
        node_header.extend(subgroup_columns);

        let mut totals = vec![0.0; labels.len()];
        for node in &network.nodes {
            let summary = node.compartments.compartment_totals();
            for (t, v) in totals.iter_mut().zip(&summary) {
                *t += v;
            }

            let fips = node
                .fips_id
                .map(|f| f.to_string())
                .unwrap_or_else(|| node.node_id.to_string());
            let mut row = vec![
                sim_id.to_string(),
                day.to_string(),
                node.node_index.to_string(),
                node.node_id.to_string(),
                fips.clone(),
            ];
            row.extend(summary.iter().map(|v| v.to_string()));
            for c in 0..labels.len() {
                for risk in RiskGroup::ALL {
                    for vaccine in VaccineGroup::ALL {
                        for age in 0..ages {
                            row.push(
                                node.compartments
                                    .get(Stratum::new(age, risk, vaccine), c)
                                    .to_string(),
                            );
                        }
                    }
                }
            }
            let path = output_dir.join(format!("node_{fips}_batch-{batch_num}.csv"));
            append_csv_row(&path, &node_header, &row)?;
        }

        let mut network_header: Vec<String> =
            ["sim_id", "day"].into_iter().map(String::from).collect();
        network_header.extend(labels.iter().cloned());
        let mut network_row = vec![sim_id.to_string(), day.to_string()];
        network_row.extend(totals.iter().map(|v| v.to_string()));
        let path = output_dir.join(format!("network_batch-{batch_num}.csv"));
        append_csv_row(&path, &network_header, &network_row)?;
        Ok(())
    }

    /// Record one realization's wall time (CSV mode only).
    pub fn record_wall_time(&self, sim_id: usize, seconds: f64) -> Result<(), OutputError> {
        let Writer::Csv {
            output_dir,
            batch_num,
        } = self
        else {
            return Ok(());
        };
        let path = output_dir.join(format!("simulation_times_batch-{batch_num}.csv"));
        append_csv_row(
            &path,
            &["sim_id".to_string(), "seconds".to_string()],
            &[sim_id.to_string(), seconds.to_string()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompartmentSet;

    fn network() -> Network {
        Network::from_population(
            CompartmentSet::seirs(),
            &[(113, vec![60.0, 40.0]), (141, vec![30.0, 20.0])],
            &[0.1, 0.2],
            Some(48000),
        )
        .unwrap()
    }

    #[test]
    fn json_mode_writes_day_files_with_totals() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer::new(dir.path(), 1, 0).unwrap();
        let net = network();
        writer.write(0, 0, &net).unwrap();
        writer.write(0, 1, &net).unwrap();

        let path = dir.path().join("output_sim0/output_1.json");
        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["day"], 1);
        assert_eq!(value["data"].as_array().unwrap().len(), 2);
        assert_eq!(value["total_summary"]["S"], 150.0);
        let first = &value["data"][0];
        assert_eq!(first["node_id"], 113);
        assert_eq!(first["fips_id"], 48113);
        assert_eq!(first["compartment_summary"]["S"], 100.0);
        // Subgroup breakdown carries the high-risk split.
        let high_unvax = first["compartment_subgroups"]["S"]["H"]["U"]
            .as_array()
            .unwrap();
        assert!((high_unvax[0].as_f64().unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn csv_mode_appends_rows_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer::new(dir.path(), 3, 1).unwrap();
        let net = network();
        writer.write(0, 0, &net).unwrap();
        writer.write(0, 1, &net).unwrap();
        writer.write(1, 0, &net).unwrap();

        let network_file =
            fs::read_to_string(dir.path().join("network_batch-1.csv")).unwrap();
        let lines: Vec<&str> = network_file.trim().lines().collect();
        assert_eq!(lines.len(), 4, "header plus three rows: {lines:?}");
        assert!(lines[0].starts_with("sim_id,day,S,E,I,R"));
        assert!(lines[1].starts_with("0,0,150"));
        assert!(lines[3].starts_with("1,0,150"));

        let node_file =
            fs::read_to_string(dir.path().join("node_48113_batch-1.csv")).unwrap();
        assert_eq!(node_file.trim().lines().count(), 4);
        assert!(node_file.contains("S_L_U_age0"));
    }

    #[test]
    fn wall_time_only_in_csv_mode() {
        let dir = tempfile::tempdir().unwrap();
        let csv_writer = Writer::new(dir.path(), 2, 0).unwrap();
        csv_writer.record_wall_time(0, 1.25).unwrap();
        csv_writer.record_wall_time(1, 0.75).unwrap();
        let times =
            fs::read_to_string(dir.path().join("simulation_times_batch-0.csv")).unwrap();
        assert_eq!(times.trim().lines().count(), 3);

        let json_dir = tempfile::tempdir().unwrap();
        let json_writer = Writer::new(json_dir.path(), 1, 0).unwrap();
        json_writer.record_wall_time(0, 1.0).unwrap();
        assert!(!json_dir.path().join("simulation_times_batch-0.csv").exists());
    }
}

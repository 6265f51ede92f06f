use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::path::PathBuf;

use glancekit::api::{Algorithm, Backend, HttpBackend, UploadKind};
use glancekit::compare::comparison_series;
use glancekit::config::Config;
use glancekit::logging::{log, obj, v_str, Domain, Level};
use glancekit::reshape::{comparative_points, ensure_label_column, metric_summary, reshape_columnar};
use glancekit::session::Session;
use glancekit::sweep::{FixedParameters, ParamValue, SweepDimension, SweepRequest};

const USAGE: &str = "usage: glancekit <command> [args]

commands:
  resources                          list datasets and models
  methods                            list local counterfactual methods
  features                           list usable features
  load <dataset> <model>             select the working dataset/model
  data                               fetch the current data tables
  target <name>                      register the label column
  generate                           run generation with the configured parameters
  apply                              apply generated actions to the affected population
  umap <identifier>                  2-D embedding of a dataset identifier
  upload <dataset|test_dataset|model> <path>
  sweep <dimension> <value>...       comparative sweep (size, method, strategy,
                                     direction, features_to_change)
  compare <gcf_size> <algorithm>...  compare algorithms at one action count

environment: GLANCE_API_BASE, GLANCE_ALGORITHM, GLANCE_GCF_SIZE, GLANCE_CF_METHOD,
GLANCE_STRATEGY, GLANCE_DIRECTION, GLANCE_FEATURES_TO_CHANGE, GLANCE_FEATURES
(comma-separated selection), LOG_LEVEL, LOG_DOMAINS, LOG_DIR";

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn selected_features_from_env() -> Vec<String> {
    std::env::var("GLANCE_FEATURES")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn arg(args: &[String], index: usize, name: &str) -> Result<String> {
    args.get(index)
        .cloned()
        .ok_or_else(|| anyhow!("missing <{}>\n\n{}", name, USAGE))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };

    let cfg = Config::from_env()?;
    let backend = HttpBackend::new(&cfg)?;
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("command", v_str(command)),
            ("api_base", v_str(backend.base().as_str())),
            ("algorithm", v_str(cfg.algorithm.endpoint())),
        ]),
    );
    let mut session = Session::new(backend);
    let fixed = FixedParameters::from_config(&cfg, selected_features_from_env());

    match command {
        "resources" => print_json(&session.backend().available_resources().await?)?,
        "methods" => print_json(&session.backend().available_cf_methods().await?)?,
        "features" => print_json(&session.fetch_features().await?)?,
        "load" => {
            let dataset = arg(&args, 1, "dataset")?;
            let model = arg(&args, 2, "model")?;
            let tables = session.load_dataset_and_model(&dataset, &model).await?;
            print_json(&serde_json::json!({
                "data": tables.data.len(),
                "X_test": tables.x_test.len(),
                "affected": tables.affected.len(),
            }))?;
        }
        "data" => {
            let tables = session.fetch_data().await?;
            print_json(&serde_json::json!({
                "data": ensure_label_column(&tables.data),
                "X_test": ensure_label_column(&tables.x_test),
                "affected": ensure_label_column(&tables.affected),
            }))?;
        }
        "target" => {
            let name = arg(&args, 1, "name")?;
            print_json(&session.register_target_name(&name).await?)?;
        }
        "generate" => {
            let generation = session.run_generation(cfg.algorithm, &fixed.params()).await?;
            match generation {
                Some(generation) => print_json(&metric_summary(generation))?,
                None => bail!("generation result discarded: dataset load in flight"),
            }
        }
        "apply" => {
            let applied = session.apply_affected_actions().await?;
            print_json(&reshape_columnar(applied))?;
        }
        "umap" => {
            let identifier = arg(&args, 1, "identifier")?;
            let embedding = session.umap_reduce(&identifier, 2).await?;
            print_json(&reshape_columnar(&embedding.reduced_data))?;
        }
        "upload" => {
            let kind: UploadKind = arg(&args, 1, "kind")?.parse()?;
            let path = PathBuf::from(arg(&args, 2, "path")?);
            print_json(&session.upload(kind, &path).await?)?;
        }
        "sweep" => {
            let dimension: SweepDimension = arg(&args, 1, "dimension")?.parse()?;
            let candidates = args[2..]
                .iter()
                .map(|raw| ParamValue::parse_for(dimension, raw))
                .collect::<Result<Vec<_>>>()?;
            let request = SweepRequest { dimension, candidates, fixed };
            let results = session.run_sweep(&request).await?;
            print_json(&comparative_points(results))?;
        }
        "compare" => {
            let gcf_size: i64 = arg(&args, 1, "gcf_size")?
                .parse()
                .map_err(|_| anyhow!("<gcf_size> must be an integer"))?;
            let algorithms = if args.len() > 2 {
                args[2..]
                    .iter()
                    .map(|a| a.parse::<Algorithm>())
                    .collect::<Result<Vec<_>>>()?
            } else {
                Algorithm::ALL.to_vec()
            };
            let report = session.compare_algorithms(&algorithms, gcf_size).await;
            print_json(&serde_json::json!({
                "series": comparison_series(&report.results, gcf_size),
                "errors": report.errors,
            }))?;
        }
        "help" | "--help" | "-h" => println!("{}", USAGE),
        other => bail!("unknown command {:?}\n\n{}", other, USAGE),
    }
    Ok(())
}

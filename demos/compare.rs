use std::env;

use optcalc::{compare, parse_point, split_constraints, MethodSelector, PlotRequest, Problem};

const USAGE: &str = "usage: compare <objective> [constraints separated by ;] [initial point x=1,y=2] [method]";

fn main() -> Result<(), String> {
    let mut args = env::args().skip(1);

    let objective = args.next().unwrap_or_else(|| {
        eprintln!("{}", USAGE);
        eprintln!("no objective given, using an example problem");
        "x^2 + y^2".to_string()
    });

    let constraints = args
        .next()
        .map(|text| split_constraints(&text))
        .unwrap_or_else(|| vec!["x + y == 1".to_string()]);

    let initial_point = match args.next() {
        Some(text) => parse_point(&text).map_err(|error| format!("{error}"))?,
        None => Default::default(),
    };

    let method = match args.next() {
        Some(text) => text.parse().map_err(|error| format!("{error}"))?,
        None => MethodSelector::All,
    };

    let problem = Problem::new(objective.clone())
        .with_constraints(constraints)
        .with_initial_point(initial_point)
        .with_method(method);

    let report = compare(&problem);
    println!("{}", report);

    match report
        .plot_request(&objective)
        .map_err(|error| format!("{error}"))?
    {
        PlotRequest::Curve { variable, markers } => {
            println!("curve of f({}) with optima:", variable);
            for marker in markers {
                println!("  {}: {:?} -> {}", marker.label, marker.point, marker.value);
            }
        }
        PlotRequest::Surface { variables, markers } => {
            println!("surface of f({}, {}) with optima:", variables[0], variables[1]);
            for marker in markers {
                println!("  {}: {:?} -> {}", marker.label, marker.point, marker.value);
            }
        }
        PlotRequest::Unsupported { variables } => {
            println!("too many variables to plot: {:?}", variables);
        }
    }

    Ok(())
}

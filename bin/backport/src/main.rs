use jbackport::backport::{
    ApiConverter, ChangeLog, Error, LambdaExpressionCollector, Program, Replacement, Settings,
    StaticInterfaceMethodRelocator,
};
use jbackport::jvm::class_file::ClassFile;
use jbackport::jvm::class_graph::{ClassGraph, ClassGraphArenas, ClassOrigin};
use jbackport::jvm::Name;

use clap::{crate_version, Arg, ArgAction, Command};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("JVM API backporter")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Rewrite class files so that they only use APIs available on older runtimes")
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("DIRECTORY")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory of class files to convert"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("DIRECTORY")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory into which changed and generated classes are written"),
        )
        .arg(
            Arg::new("library")
                .long("library")
                .value_name("DIRECTORY")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory of class files the program is converted against"),
        )
        .arg(
            Arg::new("replace-type")
                .long("replace-type")
                .value_name("FROM=TO")
                .action(ArgAction::Append)
                .help("Rename classes matching a pattern (eg. `java/time/*=org/threeten/bp/*`)"),
        )
        .arg(
            Arg::new("replace-method")
                .long("replace-method")
                .value_name("CLASS NAME DESCRIPTOR -> CLASS NAME DESCRIPTOR")
                .action(ArgAction::Append)
                .help("Redirect calls to methods matching a pattern"),
        )
        .arg(
            Arg::new("relocate")
                .long("relocate-static-interface-methods")
                .action(ArgAction::SetTrue)
                .help("Move static interface methods into helper classes"),
        )
        .arg(
            Arg::new("helper-suffix")
                .long("helper-suffix")
                .value_name("SUFFIX")
                .help("Suffix of helper classes holding relocated static methods"),
        )
        .arg(
            Arg::new("list-lambdas")
                .long("list-lambdas")
                .action(ArgAction::SetTrue)
                .help("Print the lambda expressions found in the program"),
        )
        .get_matches();

    let mut settings = Settings::new();
    if let Some(suffix) = matches.get_one::<String>("helper-suffix") {
        settings.helper_class_suffix = suffix.clone();
    }

    let mut rules = vec![];
    for rule in matches.get_many::<String>("replace-type").into_iter().flatten() {
        rules.push(parse_type_rule(rule)?);
    }
    for rule in matches.get_many::<String>("replace-method").into_iter().flatten() {
        rules.push(parse_method_rule(rule)?);
    }

    // Load everything into the class graph
    let class_graph_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_graph_arenas);
    class_graph.insert_java_library_types();

    let mut library = vec![];
    for directory in matches.get_many::<PathBuf>("library").into_iter().flatten() {
        library.extend(load_classes(directory)?);
    }
    class_graph.add_class_files(&library, ClassOrigin::Library)?;
    log::info!("Loaded {} library classes", library.len());

    let input = matches
        .get_one::<PathBuf>("input")
        .expect("input is a required argument");
    let mut program = Program::from_class_files(load_classes(input)?)?;
    class_graph.add_class_files(program.class_files(), ClassOrigin::Program)?;
    log::info!("Loaded {} program classes", program.len());

    // Run the passes
    let mut changes = ChangeLog::new();
    if matches.get_flag("relocate") {
        let relocator = StaticInterfaceMethodRelocator::new(&class_graph, &settings);
        let helpers = relocator.relocate_program(&mut program, &mut changes)?;
        log::info!("Generated {} helper classes", helpers);
    }
    let converter = ApiConverter::new(&class_graph, &settings, rules);
    converter.convert_program(&mut program, &mut changes)?;

    if matches.get_flag("list-lambdas") {
        let lambdas = LambdaExpressionCollector::new(&class_graph).collect_program(&program)?;
        for (site, lambda) in &lambdas {
            println!(
                "{} #{}: {} -> {}.{}{}",
                site.class.as_str(),
                site.invoke_dynamic.0,
                lambda
                    .interfaces
                    .iter()
                    .map(|interface| interface.as_str())
                    .collect::<Vec<_>>()
                    .join(" & "),
                lambda.invoked_class_name,
                lambda.invoked_method_name,
                lambda.invoked_descriptor
            );
        }
    }

    // Write out the results
    let output = matches
        .get_one::<PathBuf>("output")
        .expect("output is a required argument");
    let changed: BTreeSet<_> = changes
        .modified_classes
        .iter()
        .chain(changes.extra_classes.iter())
        .collect();
    for class_name in &changed {
        if let Some(class) = program.get(class_name.as_str()) {
            let class_file = output.join(format!("{}.class", class_name.as_str()));
            log::debug!("Writing {:?}", class_file);
            class.save_to_path(&class_file, true)?;
        }
    }
    log::info!(
        "Wrote {} classes ({} generated, {} instruction sequences replaced)",
        changed.len(),
        changes.extra_classes.len(),
        changes.replaced_instruction_count()
    );

    Ok(())
}

/// Parse `FROM=TO`
fn parse_type_rule(rule: &str) -> Result<Replacement, Error> {
    match rule.split_once('=') {
        Some((pattern, replacement)) => {
            Replacement::replace_type(pattern.trim(), replacement.trim())
        }
        None => Err(Error::InvalidPattern {
            pattern: rule.to_owned(),
            reason: String::from("expected `FROM=TO`"),
        }),
    }
}

/// Parse `CLASS NAME DESCRIPTOR -> CLASS NAME DESCRIPTOR`
fn parse_method_rule(rule: &str) -> Result<Replacement, Error> {
    let invalid = || Error::InvalidPattern {
        pattern: rule.to_owned(),
        reason: String::from("expected `CLASS NAME DESCRIPTOR -> CLASS NAME DESCRIPTOR`"),
    };
    let (from, to) = rule.split_once("->").ok_or_else(invalid)?;
    let from: Vec<&str> = from.split_whitespace().collect();
    let to: Vec<&str> = to.split_whitespace().collect();
    match (from.as_slice(), to.as_slice()) {
        ([class, name, descriptor], [to_class, to_name, to_descriptor]) => {
            Replacement::replace_method(class, name, descriptor, to_class, to_name, to_descriptor)
        }
        _ => Err(invalid()),
    }
}

/// Load every `.class` file under a directory
fn load_classes(directory: &Path) -> Result<Vec<ClassFile>, Error> {
    let mut classes = vec![];
    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "class") {
            log::trace!("Reading {:?}", path);
            classes.push(ClassFile::load_from_path(path)?);
        }
    }
    Ok(classes)
}

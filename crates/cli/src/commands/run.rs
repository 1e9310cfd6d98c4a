use crate::demo;
use provenant_config::Settings;
use provenant_core::{Error, Map, Result};
use provenant_instruction::{RunOptions, Runtime};
use provenant_record::parse_literal;

pub fn execute(settings: &Settings, name: &str, params: &[String], skip_deps: bool) -> Result<()> {
    let registry = demo::registry()?;
    let args = parse_params(params)?;
    let runtime = Runtime::open(&registry, settings.clone())?;

    let record = runtime.run(name, &args, RunOptions { skip_deps })?;
    tracing::debug!(uid = record.uid(), "run finished");
    println!("{}", registry.serializer().serialize(&record.result)?);
    Ok(())
}

pub fn list() -> Result<()> {
    let registry = demo::registry()?;
    for instruction in registry.instructions() {
        println!("{:<20} {}", instruction.name(), instruction.description());
        for param in instruction.params() {
            let default = param
                .default
                .as_ref()
                .map_or_else(|| "required".to_string(), |v| v.to_string());
            println!("    {} = {default}  {}", param.name, param.help);
        }
    }
    Ok(())
}

/// `key=value` pairs, values read as JSON when they parse
pub fn parse_params(params: &[String]) -> Result<Map> {
    let mut args = Map::new();
    for param in params {
        let (key, value) = param.split_once('=').ok_or_else(|| {
            Error::configuration(format!("parameter '{param}' must look like key=value"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::configuration(format!("parameter '{param}' has no name")));
        }
        if args.insert(key.to_string(), parse_literal(value.trim())).is_some() {
            return Err(Error::configuration(format!("parameter '{key}' given twice")));
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenant_core::Value;

    #[test]
    fn test_parse_params() {
        let args = parse_params(&["n=3".into(), "xc=PBE".into(), "kpts=[4, 4, 1]".into()]).unwrap();
        assert_eq!(args.get("n"), Some(&Value::from(3)));
        assert_eq!(args.get("xc"), Some(&Value::from("PBE")));
        assert_eq!(
            args.get("kpts"),
            Some(&Value::from(vec![Value::from(4), Value::from(4), Value::from(1)]))
        );

        assert!(parse_params(&["n".into()]).is_err());
        assert!(parse_params(&["n=1".into(), "n=2".into()]).is_err());
    }
}

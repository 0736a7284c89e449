//! Form schema describing the component and technology functions to a graphical front end.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::registry::Registry;
use crate::technology::{ebeam, EbeamParams, Medium, ParamValue, Parameter};
use crate::Float;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
    pub tooltip: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub defaults: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suffix: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub validates: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub validates_args: IndexMap<String, Vec<Float>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentUi {
    pub arguments: Vec<UiArgument>,
    pub hidden_arguments: IndexMap<String, String>,
    pub function: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyUi {
    pub arguments: Vec<UiArgument>,
    pub function: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSchema {
    pub components: Vec<ComponentUi>,
    pub technologies: Vec<TechnologyUi>,
}

/// Title-case a parameter name, with chemical formulas for the media.
pub fn make_label(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut titled = String::with_capacity(word.len());
            let mut prev_alpha = false;
            for c in word.chars() {
                if prev_alpha {
                    titled.extend(c.to_lowercase());
                } else {
                    titled.extend(c.to_uppercase());
                }
                prev_alpha = c.is_alphabetic();
            }

            match titled.as_str() {
                "Sin" => "Si₃N₄".to_owned(),
                "Sio2" => "SiO₂".to_owned(),
                _ => titled,
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn medium_defaults(medium: &Medium) -> Value {
    json!({
        "type": "material_library",
        "value": { "path": [medium.material, medium.variant] },
    })
}

fn technology_argument(p: &Parameter) -> UiArgument {
    let mut arg = UiArgument {
        name: p.name.to_owned(),
        label: Some(make_label(p.name)),
        tooltip: p.tooltip.to_owned(),
        ..Default::default()
    };

    match &p.value {
        ParamValue::Number(v) => {
            arg.kind = "number".to_owned();
            arg.defaults = Some(json!(v));
            if p.name.contains("angle") {
                arg.suffix = Some("°".to_owned());
                arg.validates = vec!["exclusiveMin".to_owned(), "exclusiveMax".to_owned()];
                arg.validates_args.insert("exclusiveMin".to_owned(), vec![-90.0]);
                arg.validates_args.insert("exclusiveMax".to_owned(), vec![90.0]);
            } else {
                arg.suffix = Some("μm".to_owned());
                let positive = ["thickness", "depth", "separation", "gap"]
                    .iter()
                    .any(|w| p.name.contains(w));
                if positive {
                    arg.validates = vec!["exclusiveMin".to_owned()];
                    arg.validates_args.insert("exclusiveMin".to_owned(), vec![0.0]);
                }
            }
        }
        ParamValue::Medium(m) => {
            arg.kind = "medium".to_owned();
            arg.defaults = Some(medium_defaults(m));
        }
    }

    arg
}

fn component_ui(name: &str) -> ComponentUi {
    let technology = UiArgument {
        name: "technology".to_owned(),
        kind: "technology".to_owned(),
        tooltip: "Component technology.".to_owned(),
        placeholder: Some("Use the global default technology.".to_owned()),
        required: Some(false),
        ..Default::default()
    };

    ComponentUi {
        arguments: vec![technology],
        hidden_arguments: IndexMap::from([("cell_name".to_owned(), name.to_owned())]),
        function: "component".to_owned(),
        label: name.replace('_', " "),
    }
}

/// Schema for every registered component and the EBeam technology function.
pub fn generate(registry: &Registry) -> UiSchema {
    let mut names: Vec<&str> = registry.names().collect();
    names.sort_unstable();

    let params = EbeamParams::default();
    let technology = TechnologyUi {
        arguments: params.parameters().iter().map(technology_argument).collect(),
        function: "ebeam".to_owned(),
        label: ebeam(&params).name,
    };

    UiSchema {
        components: names.into_iter().map(component_ui).collect(),
        technologies: vec![technology],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn labels() {
        assert_eq!(make_label("si_slab_thickness"), "Si Slab Thickness");
        assert_eq!(make_label("sin_mask_dilation"), "Si₃N₄ Mask Dilation");
        assert_eq!(make_label("sio2"), "SiO₂");
        assert_eq!(make_label("sidewall_angle"), "Sidewall Angle");
    }

    #[test]
    fn one_entry_per_component() {
        let registry = Registry::ebeam();
        let schema = generate(&registry);
        assert_eq!(schema.components.len(), registry.len());

        let cells: HashSet<&str> = schema
            .components
            .iter()
            .map(|c| c.hidden_arguments["cell_name"].as_str())
            .collect();
        let names: HashSet<&str> = registry.names().collect();
        assert_eq!(cells, names);

        let first = &schema.components[0];
        assert_eq!(first.function, "component");
        assert_eq!(first.label, first.hidden_arguments["cell_name"].replace('_', " "));
    }

    #[test]
    fn technology_arguments_carry_defaults() {
        let schema = generate(&Registry::ebeam());
        assert_eq!(schema.technologies.len(), 1);

        let tech = &schema.technologies[0];
        assert!(tech.label.contains("SiEPIC"));
        assert_eq!(tech.function, "ebeam");

        let params = EbeamParams::default().parameters();
        assert_eq!(tech.arguments.len(), params.len());
        for (arg, p) in tech.arguments.iter().zip(&params) {
            assert_eq!(arg.name, p.name);
            if let ParamValue::Number(v) = p.value {
                assert_eq!(arg.defaults, Some(json!(v)));
            }
        }

        let angle = tech.arguments.iter().find(|a| a.name == "sidewall_angle").unwrap();
        assert_eq!(angle.suffix.as_deref(), Some("°"));
        assert_eq!(angle.validates_args["exclusiveMax"], [90.0]);

        let dilation = tech.arguments.iter().find(|a| a.name == "si_mask_dilation").unwrap();
        assert!(dilation.validates.is_empty());

        let si = tech.arguments.iter().find(|a| a.name == "si").unwrap();
        assert_eq!(si.kind, "medium");
        assert_eq!(
            si.defaults.as_ref().unwrap()["value"]["path"],
            json!(["cSi", "Li1993_293K"])
        );
    }

    #[test]
    fn json_conversion_is_lossless() {
        let schema = generate(&Registry::ebeam());
        let text = serde_json::to_string(&schema).unwrap();
        assert!(text.contains("\"hiddenArguments\""));
        assert!(text.contains("\"validatesArgs\""));
        let back: UiSchema = serde_json::from_str(&text).unwrap();
        assert_eq!(back, schema);
    }
}

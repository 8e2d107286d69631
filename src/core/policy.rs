use crate::domain::model::ParamBlock;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

const BASELINE_JSON: &str = include_str!("../../data/policy_defaults.json");

/// 舊版 reform 檔案可能包含的頂層區段
const LEGACY_SECTIONS: [&str; 5] = [
    "policy",
    "behavior",
    "consumption",
    "growdiff_baseline",
    "growdiff_response",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Float,
    Bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValueRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSpec {
    pub title: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub indexable: bool,
    #[serde(default)]
    pub range: Option<ValueRange>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ReformError {
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("{param}: '{year}' is not a valid year")]
    InvalidYear { param: String, year: String },

    #[error("{param}: year {year} is outside the budget window {start}-{end}")]
    YearOutOfRange {
        param: String,
        year: i64,
        start: i64,
        end: i64,
    },

    #[error("{param}: {reason}")]
    InvalidValue { param: String, reason: String },

    #[error("{param}: expected {expected} values, found {found}")]
    LengthMismatch {
        param: String,
        expected: usize,
        found: usize,
    },

    #[error("{0} is not an indexable parameter")]
    NotIndexable(String),

    #[error("Malformed reform: {0}")]
    Malformed(String),
}

type ReformResult<T> = std::result::Result<T, ReformError>;

/// paramtools 格式的值一律是 list；舊版 reform 的值是 `{year: value}` 物件
pub fn is_paramtools_format(doc: &ParamBlock) -> bool {
    !doc.values().any(Value::is_object)
}

/// 現行法規的參數目錄，用來驗證與翻譯 reform
#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    start_year: i64,
    end_year: i64,
    labels: BTreeMap<String, Vec<String>>,
    parameters: BTreeMap<String, ParameterSpec>,
}

impl Policy {
    /// 載入內建的 baseline，每次呼叫都是全新的物件
    pub fn baseline() -> Result<Self, serde_json::Error> {
        serde_json::from_str(BASELINE_JSON)
    }

    pub fn start_year(&self) -> i64 {
        self.start_year
    }

    pub fn end_year(&self) -> i64 {
        self.end_year
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.get(name)
    }

    fn spec(&self, name: &str) -> ReformResult<&ParameterSpec> {
        self.parameter(name)
            .ok_or_else(|| ReformError::UnknownParameter(name.to_string()))
    }

    fn label_values(
        &self,
        name: &str,
        spec: &ParameterSpec,
    ) -> ReformResult<Option<(&str, &[String])>> {
        match &spec.label {
            None => Ok(None),
            Some(label) => self
                .labels
                .get_key_value(label)
                .map(|(key, values)| Some((key.as_str(), values.as_slice())))
                .ok_or_else(|| ReformError::InvalidValue {
                    param: name.to_string(),
                    reason: format!("unknown label dimension '{}'", label),
                }),
        }
    }

    /// 把舊版 reform 套到 baseline 上，回傳 paramtools 格式的 adjustment
    pub fn implement_reform(&self, reform: &ParamBlock) -> ReformResult<ParamBlock> {
        let reform = policy_section(reform)?;
        let by_param = if is_year_first(reform) {
            pivot_year_first(reform)?
        } else {
            param_first(reform)?
        };

        let mut collected: BTreeMap<String, BTreeMap<i64, Vec<Value>>> = BTreeMap::new();
        for (raw_name, years) in by_param {
            let name = raw_name.trim_start_matches('_');

            if let Some(base) = name.strip_suffix("_cpi") {
                let spec = self.spec(base)?;
                if !spec.indexable {
                    return Err(ReformError::NotIndexable(base.to_string()));
                }
                let out_name = format!("{}-indexed", base);
                for (year_key, value) in years {
                    let year = self.parse_year(name, &year_key)?;
                    let flag = unwrap_scalar(&value);
                    if !flag.is_boolean() {
                        return Err(ReformError::InvalidValue {
                            param: name.to_string(),
                            reason: format!("indexing switch must be true or false, got {}", flag),
                        });
                    }
                    collected
                        .entry(out_name.clone())
                        .or_default()
                        .insert(year, vec![entry(year, None, flag.clone())]);
                }
                continue;
            }

            let spec = self.spec(name)?;
            for (year_key, value) in years {
                let year = self.parse_year(name, &year_key)?;
                let entries = self.expand_value(name, spec, year, &value)?;
                collected
                    .entry(name.to_string())
                    .or_default()
                    .insert(year, entries);
            }
        }

        let mut adjustment = ParamBlock::new();
        for (name, years) in collected {
            let entries: Vec<Value> = years.into_values().flatten().collect();
            adjustment.insert(name, Value::Array(entries));
        }
        Ok(adjustment)
    }

    /// 驗證已經是 paramtools 格式的 adjustment，不改寫內容。
    /// 目錄外的參數只檢查結構，其餘交給下游 app 驗證
    pub fn validate_adjustment(&self, adjustment: &ParamBlock) -> ReformResult<()> {
        for (key, entries) in adjustment {
            let entries = entries.as_array().ok_or_else(|| {
                ReformError::Malformed(format!("{} must be a list of value objects", key))
            })?;
            let mut items = Vec::with_capacity(entries.len());
            for item in entries {
                let item = item.as_object().ok_or_else(|| {
                    ReformError::Malformed(format!("{} entries must be objects", key))
                })?;
                if !item.contains_key("value") {
                    return Err(ReformError::Malformed(format!("{} entry is missing 'value'", key)));
                }
                items.push(item);
            }

            let (name, indexed) = match key.strip_suffix("-indexed") {
                Some(base) => (base, true),
                None => (key.as_str(), false),
            };
            let Some(spec) = self.parameter(name) else {
                tracing::debug!("{} is not in the embedded catalog, passing it through", key);
                continue;
            };
            if indexed && !spec.indexable {
                return Err(ReformError::NotIndexable(name.to_string()));
            }
            let labels = self.label_values(name, spec)?;

            for item in items {
                for (field, value) in item {
                    match field.as_str() {
                        "value" if indexed => {
                            if !value.is_boolean() {
                                return Err(ReformError::InvalidValue {
                                    param: key.clone(),
                                    reason: format!("indexing switch must be true or false, got {}", value),
                                });
                            }
                        }
                        "value" => {
                            check_value(name, spec, value)?;
                        }
                        "year" => {
                            let year = value.as_i64().ok_or_else(|| ReformError::InvalidYear {
                                param: key.clone(),
                                year: value.to_string(),
                            })?;
                            self.check_year(name, year)?;
                        }
                        other => match labels {
                            Some((label, allowed)) if label == other && !indexed => {
                                let known = value
                                    .as_str()
                                    .map(|v| allowed.iter().any(|a| a == v))
                                    .unwrap_or(false);
                                if !known {
                                    return Err(ReformError::InvalidValue {
                                        param: name.to_string(),
                                        reason: format!("unknown {} value {}", label, value),
                                    });
                                }
                            }
                            _ => {
                                return Err(ReformError::InvalidValue {
                                    param: key.clone(),
                                    reason: format!("unexpected field '{}'", other),
                                })
                            }
                        },
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_year(&self, param: &str, year_key: &str) -> ReformResult<i64> {
        let year: i64 = year_key.trim().parse().map_err(|_| ReformError::InvalidYear {
            param: param.to_string(),
            year: year_key.to_string(),
        })?;
        self.check_year(param, year)?;
        Ok(year)
    }

    fn check_year(&self, param: &str, year: i64) -> ReformResult<()> {
        if year < self.start_year || year > self.end_year {
            return Err(ReformError::YearOutOfRange {
                param: param.to_string(),
                year,
                start: self.start_year,
                end: self.end_year,
            });
        }
        Ok(())
    }

    fn expand_value(
        &self,
        name: &str,
        spec: &ParameterSpec,
        year: i64,
        value: &Value,
    ) -> ReformResult<Vec<Value>> {
        match self.label_values(name, spec)? {
            None => {
                let scalar = unwrap_scalar(value);
                let checked = check_value(name, spec, scalar)?;
                Ok(vec![entry(year, None, checked)])
            }
            Some((label, label_values)) => {
                let items: Vec<&Value> = match value {
                    // 舊版格式常見 [[a, b, c, d, e]]
                    Value::Array(outer) if outer.len() == 1 && outer[0].is_array() => {
                        outer[0].as_array().map(|inner| inner.iter().collect()).unwrap_or_default()
                    }
                    Value::Array(items) => items.iter().collect(),
                    scalar => vec![scalar; label_values.len()],
                };
                if items.len() != label_values.len() {
                    return Err(ReformError::LengthMismatch {
                        param: name.to_string(),
                        expected: label_values.len(),
                        found: items.len(),
                    });
                }
                label_values
                    .iter()
                    .zip(items)
                    .map(|(label_value, item)| -> ReformResult<Value> {
                        let checked = check_value(name, spec, item)?;
                        Ok(entry(year, Some((label, label_value)), checked))
                    })
                    .collect()
            }
        }
    }
}

fn entry(year: i64, label: Option<(&str, &String)>, value: Value) -> Value {
    let mut map = Map::new();
    map.insert("year".to_string(), Value::from(year));
    if let Some((label, label_value)) = label {
        map.insert(label.to_string(), Value::String(label_value.clone()));
    }
    map.insert("value".to_string(), value);
    Value::Object(map)
}

/// `[x]` 與 `[[x]]` 都視為 x
fn unwrap_scalar(value: &Value) -> &Value {
    let mut current = value;
    while let Value::Array(items) = current {
        if items.len() != 1 {
            break;
        }
        current = &items[0];
    }
    current
}

fn check_value(name: &str, spec: &ParameterSpec, value: &Value) -> ReformResult<Value> {
    let type_ok = match spec.value_type {
        ValueType::Int => value.is_i64() || value.is_u64(),
        ValueType::Float => value.is_number(),
        ValueType::Bool => value.is_boolean(),
    };
    if !type_ok {
        return Err(ReformError::InvalidValue {
            param: name.to_string(),
            reason: format!("expected a {:?} value, got {}", spec.value_type, value).to_lowercase(),
        });
    }

    if let (Some(range), Some(number)) = (&spec.range, value.as_f64()) {
        if let Some(min) = range.min {
            if number < min {
                return Err(ReformError::InvalidValue {
                    param: name.to_string(),
                    reason: format!("value {} is below the minimum {}", value, min),
                });
            }
        }
        if let Some(max) = range.max {
            if number > max {
                return Err(ReformError::InvalidValue {
                    param: name.to_string(),
                    reason: format!("value {} is above the maximum {}", value, max),
                });
            }
        }
    }

    Ok(value.clone())
}

fn policy_section(reform: &ParamBlock) -> ReformResult<&ParamBlock> {
    let is_sectioned = reform.contains_key("policy")
        && reform.keys().all(|key| LEGACY_SECTIONS.contains(&key.as_str()));
    if !is_sectioned {
        return Ok(reform);
    }
    reform
        .get("policy")
        .and_then(Value::as_object)
        .ok_or_else(|| ReformError::Malformed("'policy' section must be an object".to_string()))
}

fn is_year_first(reform: &ParamBlock) -> bool {
    !reform.is_empty()
        && reform
            .iter()
            .all(|(key, value)| key.trim().parse::<i64>().is_ok() && value.is_object())
}

type ByParam = BTreeMap<String, Vec<(String, Value)>>;

fn param_first(reform: &ParamBlock) -> ReformResult<ByParam> {
    let mut by_param = ByParam::new();
    for (name, years) in reform {
        let years = years.as_object().ok_or_else(|| {
            ReformError::Malformed(format!("{} must map years to values", name))
        })?;
        let slot = by_param.entry(name.clone()).or_default();
        for (year, value) in years {
            slot.push((year.clone(), value.clone()));
        }
    }
    Ok(by_param)
}

fn pivot_year_first(reform: &ParamBlock) -> ReformResult<ByParam> {
    let mut by_param = ByParam::new();
    for (year, params) in reform {
        let params = params.as_object().ok_or_else(|| {
            ReformError::Malformed(format!("year {} must map parameters to values", year))
        })?;
        for (name, value) in params {
            by_param
                .entry(name.clone())
                .or_default()
                .push((year.clone(), value.clone()));
        }
    }
    Ok(by_param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(value: Value) -> ParamBlock {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_baseline_loads() {
        let policy = Policy::baseline().unwrap();
        assert_eq!(policy.start_year(), 2013);
        assert_eq!(policy.end_year(), 2035);
        assert_eq!(policy.parameter("STD").unwrap().label.as_deref(), Some("MARS"));
        assert!(policy.parameter("NOT_A_PARAM").is_none());
    }

    #[test]
    fn test_is_paramtools_format() {
        assert!(is_paramtools_format(&block(json!({}))));
        assert!(is_paramtools_format(&block(json!({"II_em": [{"year": 2020, "value": 0}]}))));
        assert!(!is_paramtools_format(&block(json!({"II_em": {"2020": 0}}))));
    }

    #[test]
    fn test_vector_parameter_expands_by_label() {
        let policy = Policy::baseline().unwrap();
        let reform = block(json!({"STD": {"2020": [12000, 24000, 12000, 18000, 24000]}}));

        let adjustment = policy.implement_reform(&reform).unwrap();

        assert_eq!(
            Value::Object(adjustment),
            json!({"STD": [
                {"year": 2020, "MARS": "single", "value": 12000},
                {"year": 2020, "MARS": "mjoint", "value": 24000},
                {"year": 2020, "MARS": "mseparate", "value": 12000},
                {"year": 2020, "MARS": "headhh", "value": 18000},
                {"year": 2020, "MARS": "widow", "value": 24000}
            ]})
        );
    }

    #[test]
    fn test_catalog_covers_whole_families() {
        let policy = Policy::baseline().unwrap();
        for prefix in ["II", "PT"] {
            for i in 1..=8 {
                assert!(policy.parameter(&format!("{}_rt{}", prefix, i)).is_some());
            }
            for i in 1..=7 {
                let bracket = policy.parameter(&format!("{}_brk{}", prefix, i)).unwrap();
                assert_eq!(bracket.label.as_deref(), Some("MARS"));
                assert!(bracket.indexable);
            }
        }
        for code in ["Medical", "StateLocalTax", "RealEstate", "InterestPaid", "Charity"] {
            assert!(policy.parameter(&format!("ID_{}_c", code)).is_some());
            assert!(policy.parameter(&format!("ID_{}_hc", code)).is_some());
        }
        assert!(policy.parameter("II_em_ps").unwrap().indexable);
    }

    #[test]
    fn test_multi_bracket_reform() {
        let policy = Policy::baseline().unwrap();
        let reform = block(json!({
            "II_rt8": {"2022": 0.45},
            "II_brk2": {"2022": [40000, 80000, 40000, 55000, 80000]},
            "II_brk6": {"2022": [450000, 600000, 300000, 450000, 600000]},
            "II_brk6_cpi": {"2023": false}
        }));

        let adjustment = policy.implement_reform(&reform).unwrap();

        let names: Vec<&String> = adjustment.keys().collect();
        assert_eq!(names, vec!["II_brk2", "II_brk6", "II_brk6-indexed", "II_rt8"]);
        assert_eq!(
            adjustment["II_brk2"][1],
            json!({"year": 2022, "MARS": "mjoint", "value": 80000})
        );
        assert_eq!(adjustment["II_brk6"].as_array().unwrap().len(), 5);
        assert_eq!(adjustment["II_rt8"], json!([{"year": 2022, "value": 0.45}]));
        assert!(policy.validate_adjustment(&adjustment).is_ok());
    }

    #[test]
    fn test_legacy_shapes_translate_identically() {
        let policy = Policy::baseline().unwrap();
        let expected = policy
            .implement_reform(&block(json!({"II_em": {"2021": 1000}, "CTC_c": {"2022": 2000}})))
            .unwrap();

        let underscored = block(json!({"_II_em": {"2021": [1000]}, "_CTC_c": {"2022": [[2000]]}}));
        let year_first = block(json!({"2021": {"_II_em": [1000]}, "2022": {"_CTC_c": [2000]}}));
        let sectioned = block(json!({
            "policy": {"II_em": {"2021": 1000}, "CTC_c": {"2022": 2000}},
            "behavior": {}
        }));

        assert_eq!(policy.implement_reform(&underscored).unwrap(), expected);
        assert_eq!(policy.implement_reform(&year_first).unwrap(), expected);
        assert_eq!(policy.implement_reform(&sectioned).unwrap(), expected);
    }

    #[test]
    fn test_output_sorted_by_name_then_year() {
        let policy = Policy::baseline().unwrap();
        let reform = block(json!({
            "II_rt7": {"2025": 0.4, "2021": 0.39},
            "CTC_c": {"2021": 3000}
        }));

        let adjustment = policy.implement_reform(&reform).unwrap();

        let names: Vec<&String> = adjustment.keys().collect();
        assert_eq!(names, vec!["CTC_c", "II_rt7"]);
        assert_eq!(
            adjustment["II_rt7"],
            json!([{"year": 2021, "value": 0.39}, {"year": 2025, "value": 0.4}])
        );
    }

    #[test]
    fn test_scalar_for_labeled_parameter_applies_to_every_label() {
        let policy = Policy::baseline().unwrap();
        let adjustment = policy
            .implement_reform(&block(json!({"EITC_c": {"2020": 0}})))
            .unwrap();
        let entries = adjustment["EITC_c"].as_array().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3], json!({"year": 2020, "EIC": "3+kids", "value": 0}));
    }

    #[test]
    fn test_cpi_switch_becomes_indexed_parameter() {
        let policy = Policy::baseline().unwrap();
        let adjustment = policy
            .implement_reform(&block(json!({"_II_em_cpi": {"2020": false}})))
            .unwrap();
        assert_eq!(
            Value::Object(adjustment),
            json!({"II_em-indexed": [{"year": 2020, "value": false}]})
        );

        let err = policy
            .implement_reform(&block(json!({"CTC_c_cpi": {"2020": false}})))
            .unwrap_err();
        assert_eq!(err, ReformError::NotIndexable("CTC_c".to_string()));
    }

    #[test]
    fn test_reform_errors() {
        let policy = Policy::baseline().unwrap();

        let err = policy
            .implement_reform(&block(json!({"standard_deduction": {"2020": 1}})))
            .unwrap_err();
        assert_eq!(err, ReformError::UnknownParameter("standard_deduction".to_string()));

        let err = policy
            .implement_reform(&block(json!({"II_em": {"twenty": 1}})))
            .unwrap_err();
        assert!(matches!(err, ReformError::InvalidYear { .. }));

        let err = policy
            .implement_reform(&block(json!({"II_em": {"2050": 1}})))
            .unwrap_err();
        assert!(matches!(err, ReformError::YearOutOfRange { year: 2050, .. }));

        let err = policy
            .implement_reform(&block(json!({"STD": {"2020": [1, 2, 3]}})))
            .unwrap_err();
        assert_eq!(
            err,
            ReformError::LengthMismatch {
                param: "STD".to_string(),
                expected: 5,
                found: 3
            }
        );

        let err = policy
            .implement_reform(&block(json!({"II_rt1": {"2020": 1.5}})))
            .unwrap_err();
        assert!(err.to_string().contains("above the maximum"));

        let err = policy
            .implement_reform(&block(json!({"CG_nodiff": {"2020": "yes"}})))
            .unwrap_err();
        assert!(err.to_string().contains("expected a bool value"));

        let err = policy
            .implement_reform(&block(json!({"EITC_MinEligAge": {"2020": 21.5}})))
            .unwrap_err();
        assert!(err.to_string().contains("expected a int value"));
    }

    #[test]
    fn test_parameters_outside_catalog_only_need_valid_structure() {
        let policy = Policy::baseline().unwrap();
        assert!(policy.parameter("Future_Provision_rt").is_none());

        let adjustment = block(json!({
            "Future_Provision_rt": [{"year": 2026, "value": 0.0}],
            "SOME_FUTURE_PARAM-indexed": [{"year": 2022, "value": false}]
        }));
        assert!(policy.validate_adjustment(&adjustment).is_ok());

        let no_value = block(json!({"Future_Provision_rt": [{"year": 2026}]}));
        assert!(matches!(
            policy.validate_adjustment(&no_value),
            Err(ReformError::Malformed(_))
        ));
        let not_a_list = block(json!({"Future_Provision_rt": {"2026": 0.0}}));
        assert!(matches!(
            policy.validate_adjustment(&not_a_list),
            Err(ReformError::Malformed(_))
        ));
    }

    #[test]
    fn test_translated_reform_passes_validation() {
        let policy = Policy::baseline().unwrap();
        let adjustment = policy
            .implement_reform(&block(json!({
                "STD": {"2020": [12000, 24000, 12000, 18000, 24000]},
                "STD_cpi": {"2021": false},
                "ID_BenefitSurtax_Switch": {"2020": [[true, true, false, false, true, true, true]]}
            })))
            .unwrap();
        assert!(policy.validate_adjustment(&adjustment).is_ok());
    }

    #[test]
    fn test_validate_adjustment_rejects_bad_entries() {
        let policy = Policy::baseline().unwrap();

        let bad_label = block(json!({"STD": [{"year": 2020, "MARS": "married", "value": 1}]}));
        assert!(policy.validate_adjustment(&bad_label).is_err());

        let bad_field = block(json!({"II_em": [{"year": 2020, "EIC": "0kids", "value": 1}]}));
        assert!(policy.validate_adjustment(&bad_field).is_err());

        let missing_value = block(json!({"II_em": [{"year": 2020}]}));
        assert!(matches!(
            policy.validate_adjustment(&missing_value),
            Err(ReformError::Malformed(_))
        ));

        let not_a_list = block(json!({"II_em": 5}));
        assert!(matches!(
            policy.validate_adjustment(&not_a_list),
            Err(ReformError::Malformed(_))
        ));
    }
}

use crate::domain::model::{Adjustment, AppId, Domain, NormalizedParamSet};
use serde_json::Value;

/// 單一應用程式：領域 → 該應用程式的參數群組名稱
#[derive(Debug)]
pub struct AppMapping {
    pub owner: &'static str,
    pub title: &'static str,
    pub groups: &'static [(Domain, &'static str)],
}

/// 固定三個應用程式，順序即 fan-out 回報順序
pub static APPLICATIONS: [AppMapping; 3] = [
    AppMapping {
        owner: "PSLmodels",
        title: "Cost-of-Capital-Calculator",
        groups: &[
            (Domain::Policy, "Individual and Payroll Tax Parameters"),
            (Domain::Ccc, "Business Tax Parameters"),
        ],
    },
    AppMapping {
        owner: "PSLmodels",
        title: "Tax-Cruncher",
        groups: &[
            (Domain::Policy, "Policy"),
            (Domain::Taxcrunch, "Tax Information"),
        ],
    },
    AppMapping {
        owner: "PSLmodels",
        title: "Tax-Brain",
        groups: &[(Domain::Policy, "policy"), (Domain::Behavior, "behavior")],
    },
];

impl AppMapping {
    pub fn app_id(&self) -> AppId {
        AppId::new(self.owner, self.title)
    }

    pub fn matches(&self, app: &AppId) -> bool {
        app.owner == self.owner && app.title == self.title
    }

    pub fn build_adjustment(&self, params: &NormalizedParamSet) -> Adjustment {
        let mut adjustment = Adjustment::default();
        for (domain, label) in self.groups {
            adjustment
                .0
                .insert(label.to_string(), Value::Object(params.get(*domain).clone()));
        }
        adjustment
    }
}

pub fn find(app: &AppId) -> Option<&'static AppMapping> {
    APPLICATIONS.iter().find(|mapping| mapping.matches(app))
}

pub fn app_ids() -> Vec<AppId> {
    APPLICATIONS.iter().map(AppMapping::app_id).collect()
}

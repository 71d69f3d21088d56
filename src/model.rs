use chrono::{DateTime, Local};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespaces,
    Pods,
    Containers,
    Services,
    Deployments,
    ConfigMaps,
    Secrets,
    PortForwards,
}

impl ResourceKind {
    pub const ALL: [Self; 8] = [
        Self::Namespaces,
        Self::Pods,
        Self::Containers,
        Self::Services,
        Self::Deployments,
        Self::ConfigMaps,
        Self::Secrets,
        Self::PortForwards,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Namespaces => "Namespaces",
            Self::Pods => "Pods",
            Self::Containers => "Containers",
            Self::Services => "Services",
            Self::Deployments => "Deployments",
            Self::ConfigMaps => "ConfigMaps",
            Self::Secrets => "Secrets",
            Self::PortForwards => "PortForwards",
        }
    }

    pub fn short_token(self) -> &'static str {
        match self {
            Self::Namespaces => "ns",
            Self::Pods => "po",
            Self::Containers => "co",
            Self::Services => "svc",
            Self::Deployments => "deploy",
            Self::ConfigMaps => "cm",
            Self::Secrets => "secrets",
            Self::PortForwards => "pf",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "ns" | "namespace" | "namespaces" => Some(Self::Namespaces),
            "po" | "pod" | "pods" => Some(Self::Pods),
            "co" | "container" | "containers" => Some(Self::Containers),
            "svc" | "service" | "services" => Some(Self::Services),
            "deploy" | "deployment" | "deployments" | "dp" => Some(Self::Deployments),
            "cm" | "configmap" | "configmaps" | "config-map" | "config-maps" => {
                Some(Self::ConfigMaps)
            }
            "sec" | "secret" | "secrets" => Some(Self::Secrets),
            "pf" | "portforward" | "portforwards" | "port-forward" | "port-forwards" => {
                Some(Self::PortForwards)
            }
            _ => None,
        }
    }

    pub fn status_column(self) -> Option<usize> {
        match self {
            Self::Pods => Some(3),
            Self::Containers => Some(3),
            Self::Namespaces => Some(1),
            Self::PortForwards => Some(3),
            _ => None,
        }
    }

    pub fn ports_column(self) -> Option<usize> {
        match self {
            Self::Pods => Some(5),
            Self::Containers => Some(6),
            Self::Services => Some(3),
            _ => None,
        }
    }

    pub fn age_column(self) -> Option<usize> {
        match self {
            Self::Namespaces => Some(2),
            Self::Pods => Some(7),
            Self::Containers => Some(7),
            Self::Services => Some(4),
            Self::Deployments => Some(5),
            Self::ConfigMaps => Some(3),
            Self::Secrets => Some(4),
            Self::PortForwards => Some(4),
        }
    }

    pub fn namespaced(self) -> bool {
        !matches!(self, Self::Namespaces | Self::PortForwards)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    namespace: Option<String>,
    name: Option<String>,
}

impl ResourcePath {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: None,
        }
    }

    pub fn object(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: Some(name.into()),
        }
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "all" || raw == "-" {
            return Self::all();
        }
        match raw.split_once('/') {
            Some((namespace, name)) if !name.is_empty() => Self::object(namespace, name),
            Some((namespace, _)) => Self::namespace(namespace),
            None => Self::namespace(raw),
        }
    }

    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn object_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_all(&self) -> bool {
        self.namespace.is_none() && self.name.is_none()
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.namespace, &self.name) {
            (None, None) => write!(f, "all"),
            (Some(namespace), None) => write!(f, "{namespace}"),
            (Some(namespace), Some(name)) => write!(f, "{namespace}/{name}"),
            (None, Some(name)) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RowData {
    pub name: String,
    pub namespace: Option<String>,
    pub columns: Vec<String>,
    pub detail: String,
    pub default_container: Option<String>,
}

impl RowData {
    pub fn cell(&self, column: usize) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<RowData>,
    pub selected: usize,
    pub last_refreshed: Option<DateTime<Local>>,
    pub error: Option<String>,
}

impl TableData {
    pub fn set_rows(
        &mut self,
        headers: Vec<String>,
        rows: Vec<RowData>,
        refreshed_at: DateTime<Local>,
    ) {
        self.headers = headers;
        self.rows = rows;
        self.last_refreshed = Some(refreshed_at);
        self.error = None;
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    pub fn set_error(&mut self, error: impl Into<String>, refreshed_at: DateTime<Local>) {
        self.rows.clear();
        self.error = Some(error.into());
        self.last_refreshed = Some(refreshed_at);
        self.selected = 0;
    }

    pub fn selected_row(&self) -> Option<&RowData> {
        self.rows.get(self.selected)
    }

    pub fn sort_by_column(&mut self, column: usize, ascending: bool, by_age: bool) {
        let selected_name = self.selected_row().map(|row| row.name.clone());
        self.rows.sort_by(|left, right| {
            let left_cell = left.cell(column).unwrap_or("");
            let right_cell = right.cell(column).unwrap_or("");
            let ordering = if by_age {
                compare_ages(left_cell, right_cell)
            } else {
                left_cell.cmp(right_cell)
            }
            .then_with(|| left.name.cmp(&right.name));
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        if let Some(name) = selected_name
            && let Some(index) = self.rows.iter().position(|row| row.name == name)
        {
            self.selected = index;
        }
    }
}

pub fn format_elapsed_seconds(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

fn compare_ages(left: &str, right: &str) -> Ordering {
    match (age_seconds(left), age_seconds(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

fn age_seconds(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(number) = value.parse::<i64>() {
        return Some(number);
    }
    let (split, unit) = value.char_indices().last()?;
    let amount = value[..split].parse::<i64>().ok()?;
    let scale = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return None,
    };
    amount.checked_mul(scale)
}

#[cfg(test)]
mod tests {
    use super::{ResourceKind, ResourcePath, RowData, TableData};
    use chrono::Local;

    fn row(name: &str, age: &str) -> RowData {
        RowData {
            name: name.to_string(),
            namespace: Some("default".to_string()),
            columns: vec![name.to_string(), age.to_string()],
            detail: String::new(),
            default_container: None,
        }
    }

    #[test]
    fn resource_aliases_map_to_expected_kinds() {
        assert_eq!(ResourceKind::from_token("po"), Some(ResourceKind::Pods));
        assert_eq!(
            ResourceKind::from_token("Port-Forwards"),
            Some(ResourceKind::PortForwards)
        );
        assert_eq!(ResourceKind::from_token("cm"), Some(ResourceKind::ConfigMaps));
        assert_eq!(ResourceKind::from_token("sec"), Some(ResourceKind::Secrets));
        assert_eq!(ResourceKind::from_token("nodes"), None);
    }

    #[test]
    fn every_kind_round_trips_through_its_short_token() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_token(kind.short_token()), Some(kind));
        }
    }

    #[test]
    fn path_parses_namespace_and_object_forms() {
        assert_eq!(ResourcePath::parse("ns1/pod1"), ResourcePath::object("ns1", "pod1"));
        assert_eq!(ResourcePath::parse("ns1"), ResourcePath::namespace("ns1"));
        assert!(ResourcePath::parse("all").is_all());
        assert_eq!(ResourcePath::object("ns1", "pod1").to_string(), "ns1/pod1");
        assert_eq!(ResourcePath::all().to_string(), "all");
    }

    #[test]
    fn age_sort_orders_by_duration_and_keeps_selection() {
        let mut table = TableData::default();
        table.set_rows(
            vec!["Name".to_string(), "Age".to_string()],
            vec![row("a", "2h"), row("b", "90s"), row("c", "3m")],
            Local::now(),
        );
        table.selected = 2;

        table.sort_by_column(1, true, true);
        let names = table
            .rows
            .iter()
            .map(|row| row.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert_eq!(table.selected_row().map(|row| row.name.as_str()), Some("c"));

        table.sort_by_column(1, false, true);
        assert_eq!(table.rows[0].name, "a");
    }

    #[test]
    fn name_sort_is_lexical_even_for_duration_like_names() {
        let mut table = TableData::default();
        table.set_rows(
            vec!["Name".to_string(), "Age".to_string()],
            vec![
                row("9999999999999999d", "1m"),
                row("web", "2m"),
                row("10m", "3m"),
                row("2h", "4m"),
            ],
            Local::now(),
        );

        table.sort_by_column(0, true, false);
        let names = table
            .rows
            .iter()
            .map(|row| row.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["10m", "2h", "9999999999999999d", "web"]);
    }

    #[test]
    fn overflowing_ages_fall_back_to_text_order() {
        let mut table = TableData::default();
        table.set_rows(
            vec!["Name".to_string(), "Age".to_string()],
            vec![row("a", "9999999999999999d"), row("b", "5m")],
            Local::now(),
        );

        table.sort_by_column(1, true, true);
        assert_eq!(table.rows[0].name, "b");
    }
}

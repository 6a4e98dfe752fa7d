//! Tableau mark class to Looker visualization type.

use crate::config::VisualizationConfig;

/// Every Tableau mark class with a Looker counterpart. Matching is
/// case-insensitive; anything absent falls back.
pub const VIS_TABLE: &[(&str, &str)] = &[
    ("automatic", "looker_grid"),
    ("text", "looker_grid"),
    ("bar", "looker_column"),
    ("line", "looker_line"),
    ("area", "looker_area"),
    ("circle", "looker_scatter"),
    ("shape", "looker_scatter"),
    ("square", "looker_grid"),
    ("pie", "looker_pie"),
    ("map", "looker_geo_coordinates"),
    ("polygon", "looker_geo_choropleth"),
    ("multipolygon", "looker_geo_choropleth"),
    ("gantt", "looker_timeline"),
    ("ganttbar", "looker_timeline"),
];

/// Result of a lookup: the type to render and whether it was a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisMapping {
    pub looker_type: String,
    pub fallback: bool,
}

/// Overrides first, then the built-in table, then the configured fallback.
pub fn map_visualization(mark: &str, config: &VisualizationConfig) -> VisMapping {
    let key = mark.trim();

    if let Some((_, looker)) = config
        .overrides
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
    {
        return VisMapping {
            looker_type: looker.clone(),
            fallback: false,
        };
    }

    match VIS_TABLE
        .iter()
        .find(|(tableau, _)| tableau.eq_ignore_ascii_case(key))
    {
        Some((_, looker)) => VisMapping {
            looker_type: looker.to_string(),
            fallback: false,
        },
        None => VisMapping {
            looker_type: config.fallback.clone(),
            fallback: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_marks_map() {
        let config = VisualizationConfig::default();
        assert_eq!(map_visualization("Line", &config).looker_type, "looker_line");
        assert_eq!(map_visualization("BAR", &config).looker_type, "looker_column");
        assert_eq!(
            map_visualization("Map", &config).looker_type,
            "looker_geo_coordinates"
        );
        assert!(!map_visualization("Automatic", &config).fallback);
    }

    #[test]
    fn unknown_marks_fall_back() {
        let config = VisualizationConfig::default();
        let mapping = map_visualization("Treemap", &config);
        assert!(mapping.fallback);
        assert_eq!(mapping.looker_type, "table");
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = VisualizationConfig::default();
        config
            .overrides
            .insert("line".to_string(), "looker_area".to_string());
        config
            .overrides
            .insert("Treemap".to_string(), "looker_grid".to_string());
        assert_eq!(map_visualization("Line", &config).looker_type, "looker_area");
        let treemap = map_visualization("treemap", &config);
        assert_eq!(treemap.looker_type, "looker_grid");
        assert!(!treemap.fallback);
    }
}

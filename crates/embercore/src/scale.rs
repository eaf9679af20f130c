//! Static catalog of estimation scales.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Scale {
    pub id: &'static str,
    pub name: &'static str,
    pub values: &'static [&'static str],
}

static SCALES: &[Scale] = &[
    Scale {
        id: "fibonacci",
        name: "Fibonacci",
        values: &["0", "1", "2", "3", "5", "8", "13", "21", "34", "55", "89", "?"],
    },
    Scale {
        id: "power_of_2",
        name: "Power of 2",
        values: &["1", "2", "4", "8", "16", "32", "64", "?"],
    },
    Scale {
        id: "linear",
        name: "Linear",
        values: &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "?"],
    },
    Scale {
        id: "tshirt",
        name: "T-shirt",
        values: &["XS", "S", "M", "L", "XL", "XXL", "?"],
    },
];

pub fn all() -> &'static [Scale] {
    SCALES
}

pub fn get(id: &str) -> Option<&'static Scale> {
    SCALES.iter().find(|s| s.id == id)
}

/// Whether `value` is a legal vote for the given scale.
pub fn valid_value(scale_id: &str, value: &str) -> bool {
    get(scale_id).is_some_and(|s| s.values.contains(&value))
}

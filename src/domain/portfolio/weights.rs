//! Weight normalization and box-constrained redistribution.
//!
//! All routines work on ordered maps so that results are deterministic, run
//! a fixed-point loop with an explicit iteration ceiling, and fall back to an
//! equal split rather than assume convergence.

use std::collections::BTreeMap;

pub type Weights = BTreeMap<String, f64>;

const EPS: f64 = 1e-12;

/// Clip negatives (and non-finite values) to zero and scale to sum 1.
/// An all-zero input becomes an equal split.
pub fn normalize(raw: &Weights) -> Weights {
    let clean: Weights = raw
        .iter()
        .map(|(k, v)| (k.clone(), if v.is_finite() { v.max(0.0) } else { 0.0 }))
        .collect();
    let total: f64 = clean.values().sum();
    if total <= 0.0 {
        return equal_split(clean.keys());
    }
    clean.into_iter().map(|(k, v)| (k, v / total)).collect()
}

pub fn equal_split<'a>(keys: impl IntoIterator<Item = &'a String>) -> Weights {
    let keys: Vec<&String> = keys.into_iter().collect();
    let w = if keys.is_empty() {
        0.0
    } else {
        1.0 / keys.len() as f64
    };
    keys.into_iter().map(|k| (k.clone(), w)).collect()
}

/// Project `raw` onto the simplex with every weight in `[low, high]`.
///
/// Free weights share the unfixed remainder in proportion to their raw
/// share; those that would breach a bound are pinned there and the rest are
/// rescaled on the next round. The caller supplies feasible bounds
/// (`low * n <= 1 <= high * n`).
pub fn project_bounded(raw: &Weights, low: f64, high: f64) -> Weights {
    if raw.is_empty() {
        return Weights::new();
    }
    let base = normalize(raw);
    let mut fixed = Weights::new();
    let mut free: Vec<&String> = base.keys().collect();

    for _ in 0..=base.len() {
        let rem = (1.0 - fixed.values().sum::<f64>()).max(0.0);
        let free_raw: f64 = free.iter().map(|k| base[*k]).sum();

        let trial: Vec<(&String, f64)> = free
            .iter()
            .map(|k| {
                let share = if free_raw > 0.0 {
                    base[*k] / free_raw
                } else {
                    1.0 / free.len() as f64
                };
                (*k, rem * share)
            })
            .collect();

        // pin ceiling breaches first; floors only once nothing is above the cap
        let over: Vec<&String> = trial
            .iter()
            .filter(|(_, w)| *w > high + EPS)
            .map(|(k, _)| *k)
            .collect();
        let (pins, bound) = if over.is_empty() {
            let under: Vec<&String> = trial
                .iter()
                .filter(|(_, w)| *w < low - EPS)
                .map(|(k, _)| *k)
                .collect();
            (under, low)
        } else {
            (over, high)
        };

        if pins.is_empty() {
            let mut out = fixed;
            out.extend(trial.into_iter().map(|(k, w)| (k.clone(), w)));
            return out;
        }
        for k in pins {
            fixed.insert(k.clone(), bound);
        }

        free.retain(|k| !fixed.contains_key(*k));
        if free.is_empty() {
            let total: f64 = fixed.values().sum();
            if (total - 1.0).abs() <= 1e-9 {
                return fixed;
            }
            break;
        }
    }

    tracing::debug!(n = base.len(), low, high, "bounded projection did not settle, using equal split");
    equal_split(base.keys())
}

/// Cap-and-redistribute: normalize, then pin every weight above
/// `max_weight` at the cap and hand the excess to the uncapped names in
/// proportion. When the cap is infeasible for the number of names carrying
/// weight it is raised to `1/k`.
pub fn cap_and_redistribute(raw: &Weights, max_weight: f64) -> Weights {
    if raw.is_empty() {
        return Weights::new();
    }
    let base = normalize(raw);
    let live = base.values().filter(|w| **w > 0.0).count().max(1);
    let cap = max_weight.max(1.0 / live as f64);
    project_bounded(&base, 0.0, cap)
}

/// Water-fill `total` across `raw` scores with a per-name ceiling of
/// `max(single_cap, total / n)`. The result sums to `total`.
pub fn allocate_with_cap(total: f64, raw: &Weights, single_cap: f64) -> Weights {
    if raw.is_empty() {
        return Weights::new();
    }
    let total = if total.is_finite() { total.max(0.0) } else { 0.0 };
    if total <= 0.0 {
        return raw.keys().map(|k| (k.clone(), 0.0)).collect();
    }

    let n = raw.len();
    let cap = single_cap.max(total / n as f64);
    let base = normalize(raw);
    let mut alloc: Weights = base.iter().map(|(k, w)| (k.clone(), (w * total).min(cap))).collect();

    for _ in 0..=n {
        let rem = total - alloc.values().sum::<f64>();
        if rem <= 1e-12 {
            break;
        }
        let free: Vec<String> = alloc
            .iter()
            .filter(|(_, w)| **w + EPS < cap)
            .map(|(k, _)| k.clone())
            .collect();
        if free.is_empty() {
            break;
        }
        let free_raw: f64 = free.iter().map(|k| base[k]).sum();
        for k in &free {
            let add = if free_raw > 0.0 {
                rem * base[k] / free_raw
            } else {
                rem / free.len() as f64
            };
            if let Some(w) = alloc.get_mut(k) {
                *w = (*w + add).min(cap);
            }
        }
    }
    alloc
}

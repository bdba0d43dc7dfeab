//! Point estimates of the spider's parts.

use crate::error::{PbpError, Result};
use crate::graph::{NUM_LIMBS, NUM_NODES, ROOT};

/// Root body center.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct RootPose {
    pub x: f64,
    pub y: f64,
}

/// Limb center and axis orientation (radians, image frame, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct LimbPose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// One root pose plus the eight limbs in topology order (inner 1..=4, then
/// outer 5..=8).
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct SpiderEstimate {
    pub root: RootPose,
    pub limbs: [LimbPose; NUM_LIMBS],
}

impl SpiderEstimate {
    /// Assemble from per-node state vectors indexed by node id.
    ///
    /// Expects exactly one `[x, y]` root state followed by eight `[x, y, θ]`
    /// limb states.
    pub(crate) fn from_states(states: &[Vec<f64>]) -> Result<Self> {
        if states.len() != NUM_NODES {
            return Err(PbpError::MalformedPose(format!(
                "expected {} part states, got {}",
                NUM_NODES,
                states.len()
            )));
        }
        for (id, s) in states.iter().enumerate() {
            let expected = if id == ROOT { 2 } else { 3 };
            if s.len() != expected {
                return Err(PbpError::MalformedPose(format!(
                    "part {} has {} values, expected {}",
                    id,
                    s.len(),
                    expected
                )));
            }
        }

        let mut limbs = [LimbPose::default(); NUM_LIMBS];
        for (limb, s) in limbs.iter_mut().zip(&states[1..]) {
            *limb = LimbPose {
                x: s[0],
                y: s[1],
                theta: s[2],
            };
        }
        Ok(Self {
            root: RootPose {
                x: states[ROOT][0],
                y: states[ROOT][1],
            },
            limbs,
        })
    }

    /// State vector of node `id` (`[x, y]` for the root, `[x, y, θ]` for limbs).
    pub fn state(&self, id: usize) -> Vec<f64> {
        if id == 0 {
            vec![self.root.x, self.root.y]
        } else {
            let l = &self.limbs[id - 1];
            vec![l.x, l.y, l.theta]
        }
    }

    /// All node states in topology order.
    pub fn states(&self) -> Vec<Vec<f64>> {
        (0..NUM_NODES).map(|id| self.state(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_round_trip_through_estimate() {
        let states: Vec<Vec<f64>> = (0..NUM_NODES)
            .map(|id| {
                if id == 0 {
                    vec![1.0, 2.0]
                } else {
                    vec![id as f64, 0.5 * id as f64, 0.1]
                }
            })
            .collect();
        let est = SpiderEstimate::from_states(&states).unwrap();
        assert_eq!(est.root, RootPose { x: 1.0, y: 2.0 });
        assert_eq!(est.limbs[4].x, 5.0);
        assert_eq!(est.states(), states);
    }

    #[test]
    fn short_or_truncated_states_are_rejected() {
        let mut states = SpiderEstimate::default().states();
        states.pop();
        assert!(matches!(
            SpiderEstimate::from_states(&states),
            Err(PbpError::MalformedPose(_))
        ));

        let mut states = SpiderEstimate::default().states();
        states[ROOT] = vec![1.0];
        assert!(SpiderEstimate::from_states(&states).is_err());

        let mut states = SpiderEstimate::default().states();
        states[6].truncate(2);
        assert!(SpiderEstimate::from_states(&states).is_err());
    }
}

//! The ELO-style rating model described in section 3: base MMR per rank
//! tier/division, and the LP delta formula applied on match completion.

/// K-factor for the LP delta formula. Configurable in theory; fixed here
/// because every deployment we've seen runs with the default.
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Rank tiers, lowest to highest, with their base MMR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RankTier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl RankTier {
    fn base_mmr(self) -> i32 {
        match self {
            RankTier::Iron => 800,
            RankTier::Bronze => 1000,
            RankTier::Silver => 1200,
            RankTier::Gold => 1400,
            RankTier::Platinum => 1600,
            RankTier::Emerald => 1800,
            RankTier::Diamond => 2000,
            RankTier::Master => 2400,
            RankTier::Grandmaster => 2800,
            RankTier::Challenger => 3200,
        }
    }
}

/// Division within a tier. Master+ tiers have no divisions; callers should
/// pass [`Division::None`] and this still works (0 bonus).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Division {
    I,
    II,
    III,
    IV,
    None,
}

impl Division {
    fn bonus(self) -> i32 {
        match self {
            Division::I => 150,
            Division::II => 100,
            Division::III => 50,
            Division::IV => 0,
            Division::None => 0,
        }
    }
}

/// Computes the MMR a player's ranked tier/division/LP implies, per section 3:
/// `base(tier) + bonus(division) + round(0.8 * leaguePoints)`.
pub fn rank_to_mmr(tier: RankTier, division: Division, league_points: i32) -> i32 {
    tier.base_mmr() + division.bonus() + (0.8 * league_points as f64).round() as i32
}

/// Outcome of a match from one player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Loss,
    Win,
}

impl Outcome {
    fn as_f64(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
        }
    }
}

/// Computes the signed LP delta for a player with rating `r` against an
/// opposing team whose average rating is `ro`, given outcome `w`:
///
/// `lp = round(k * (w - 1 / (1 + 10^((ro - r) / 400))))`
///
/// Applying this with `(r, ro, Win)` and `(ro, r, Loss)` sums to zero within
/// rounding - the symmetric opponent's delta is the negation of the winner's.
pub fn lp_delta(r: i32, ro: i32, w: Outcome, k: f64) -> i32 {
    let expected = 1.0 / (1.0 + 10f64.powf((ro - r) as f64 / 400.0));
    (k * (w.as_f64() - expected)).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s7_lp_scenario_matches_formula() {
        // team1 avg 1450, team2 avg 1520; P1 on team1 at MMR 1500 wins.
        // Section 3's worked example rounds this to "~15"; the formula
        // itself (applied literally) lands at 17 - keep the implementation
        // honest to the formula rather than the prose approximation.
        let p1 = lp_delta(1500, 1520, Outcome::Win, DEFAULT_K_FACTOR);
        assert_eq!(p1, 17);
    }

    #[test]
    fn win_and_loss_are_antisymmetric() {
        let r = 1500;
        let ro = 1520;
        let win = lp_delta(r, ro, Outcome::Win, DEFAULT_K_FACTOR);
        let loss_reversed = lp_delta(ro, r, Outcome::Loss, DEFAULT_K_FACTOR);
        assert_eq!(win + loss_reversed, 0);
    }

    #[test]
    fn rank_to_mmr_applies_tier_division_and_lp() {
        assert_eq!(rank_to_mmr(RankTier::Iron, Division::IV, 0), 800);
        assert_eq!(rank_to_mmr(RankTier::Gold, Division::I, 50), 1400 + 150 + 40);
        assert_eq!(rank_to_mmr(RankTier::Challenger, Division::None, 1000), 3200 + 800);
    }
}

use super::Match;

/// Keeps the best `max` matches, sorted largest score first, one per label.
pub struct MatchCollector<'a> {
    max: usize,
    matches: &'a mut Vec<Match>,
}

impl<'a> MatchCollector<'a> {
    pub fn new(matches: &mut Vec<Match>, max: usize) -> MatchCollector {
        assert!(max > 0, "Expected a positive number for the maximum number of matches.");
        assert!(matches.is_empty(), "The pre-existing matches vector must be empty.");
        MatchCollector { max, matches }
    }

    fn remove_existing_lower(&mut self, mc: &Match) -> bool {
        let ix = match self.matches.iter().position(|x| x.label == mc.label) {
            Some(ix) => ix,
            // Not there yet: match doesn't need to be skipped
            None => return false,
        };
        // New score is not better: skip new match
        if mc.score <= self.matches[ix].score {
            return true;
        }
        self.matches.remove(ix);
        false
    }

    pub fn file_match(&mut self, mc: Match) {
        // Already at limit: don't bother if new match's score is not above current minimum
        if self.matches.len() == self.max {
            if let Some(last) = self.matches.last() {
                if mc.score <= last.score {
                    return;
                }
            }
        }
        // Same label already there with a higher score
        if self.remove_existing_lower(&mc) {
            return;
        }
        // Keep vector sorted largest score to smallest; equal scores keep filing order
        match self.matches.iter().position(|x| x.score < mc.score) {
            Some(ix) => self.matches.insert(ix, mc),
            None => self.matches.push(mc),
        }
        if self.matches.len() > self.max {
            self.matches.pop();
        }
    }
}

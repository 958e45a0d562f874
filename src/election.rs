//! C5: the famous-witness election via virtual voting (spec §4.5), the
//! hardest single piece of the core.
use crate::address_book::AddressBook;
use crate::config::Config;
use crate::event::EventId;
use crate::graph::Graph;
use std::collections::HashMap;

/// The in-progress election for a single witness's fame.
#[derive(Debug)]
struct Election {
    round: i64,
    witness: EventId,
    /// Votes cast so far, keyed by the voting round, then by the voting
    /// witness's id. A round-`r+d` witness's vote on this election is
    /// recorded under key `r+d` once it is computed, so later elections
    /// (`r+d+1` and beyond) can read it back without recomputation.
    votes: HashMap<i64, HashMap<EventId, bool>>,
}

/// A decided election outcome, returned to the ingest pipeline so it can
/// write the witness's fame and check whether its round is now fully
/// decided.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub witness: EventId,
    pub round: i64,
    pub famous: bool,
}

/// All elections currently in progress, one per undecided witness.
#[derive(Debug, Default)]
pub struct Elections {
    by_witness: HashMap<EventId, Election>,
}

impl Elections {
    /// An empty election table.
    pub fn new() -> Self {
        Self {
            by_witness: HashMap::new(),
        }
    }

    /// Opens a new election for a witness that was just admitted.
    pub fn open(&mut self, witness: EventId, round: i64) {
        self.by_witness.insert(
            witness,
            Election {
                round,
                witness,
                votes: HashMap::new(),
            },
        );
    }

    /// Runs every voting step that a newly admitted witness `voter` (in
    /// round `voter_round`) newly enables, across all elections still
    /// undecided for earlier rounds. Returns the elections this vote
    /// decided, if any, and removes them from the table.
    pub fn process_new_witness(
        &mut self,
        graph: &Graph,
        book: &AddressBook,
        config: &Config,
        voter: EventId,
        voter_round: i64,
    ) -> Vec<Decision> {
        let mut decisions = Vec::new();
        let mut decided_witnesses = Vec::new();

        for election in self.by_witness.values_mut() {
            let d = voter_round - election.round;
            if d < 1 {
                continue;
            }

            let vote = if d == 1 {
                graph.sees(voter, election.witness)
            } else {
                let prev_round = voter_round - 1;
                let (mut yes_stake, mut no_stake) = (0u64, 0u64);
                if let Some(prev_votes) = election.votes.get(&prev_round) {
                    for (&prev_voter, &prev_vote) in prev_votes {
                        if graph.strongly_sees(voter, prev_voter, book) {
                            let creator = graph.event(prev_voter).unwrap().creator();
                            let stake = book.stake(creator);
                            if prev_vote {
                                yes_stake += stake;
                            } else {
                                no_stake += stake;
                            }
                        }
                    }
                }

                let is_coin_round = d % (config.coin_round_frequency as i64) == 0;
                if !is_coin_round {
                    let vote = yes_stake >= no_stake;
                    if book.is_supermajority(yes_stake.max(no_stake)) {
                        decided_witnesses.push(election.witness);
                        decisions.push(Decision {
                            witness: election.witness,
                            round: election.round,
                            famous: vote,
                        });
                    }
                    vote
                } else {
                    // Coin rounds never decide (spec §4.5): a supermajority
                    // here only sets this round's vote to that value for
                    // the next round to tally; it takes a normal round's
                    // supermajority to actually close the election.
                    if book.is_supermajority(yes_stake) {
                        true
                    } else if book.is_supermajority(no_stake) {
                        false
                    } else {
                        graph.event(voter).unwrap().hash().coin_bit()
                    }
                }
            };

            election
                .votes
                .entry(voter_round)
                .or_default()
                .insert(voter, vote);
        }

        for witness in decided_witnesses {
            self.by_witness.remove(&witness);
        }
        decisions
    }

    /// Whether an election for this witness is still open.
    pub fn is_undecided(&self, witness: EventId) -> bool {
        self.by_witness.contains_key(&witness)
    }
}

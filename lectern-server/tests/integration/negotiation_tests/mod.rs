pub mod test_candidate_buffering;
pub mod test_full_negotiation;
pub mod test_glare_tie_break;

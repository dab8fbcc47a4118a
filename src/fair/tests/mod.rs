mod fixtures;

mod test_adjacency_basic;
mod test_fair_pos;
mod test_fair_context;

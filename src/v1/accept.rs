use tracing::{debug, info, warn};

use super::block::{total_work, Block};
use super::error::{AcceptResult, ErrorKind};
use super::state::Node;
use super::validate::{validate_block, validate_tx};
use super::transaction::Tx;

/// Classify an incoming block against the chain and the side branches, and
/// fold it in. Exactly one of six things happens: the block is a duplicate,
/// extends the chain, forks the chain, extends a branch (possibly causing a
/// reorg), forks a branch, or has no known parent. All of it runs under the
/// node lock; the caller gossips accepted blocks and reacts to
/// [ErrorKind::UnknownParent] after releasing it.
pub fn accept_block(node: &mut Node, block: Block) -> AcceptResult<()> {
    let block_id = block.id();
    if node.contains_block(&block_id) {
        return Err(Box::new(ErrorKind::DuplicateBlock));
    }

    let tip_id = node.tip().id();
    let extends_chain = block.prev_id == Some(tip_id);
    let forks_chain = !extends_chain
        && block
            .prev_id
            .map_or(false, |prev| node.blocks.iter().any(|b| b.id() == prev));
    let prev_in_branch = block.prev_id.and_then(|prev| node.find_in_branch(&prev));

    // A block that does not extend the tip only has to prove its work here;
    // its transactions are re-checked if a reorg makes its branch the chain.
    validate_block(node, &block, extends_chain)?;

    if extends_chain {
        connect_block(node, block);
        info!("extended chain to height {}", node.blocks.len() - 1);
    } else if forks_chain {
        node.branches.push(vec![block]);
        info!("created branch {}", node.branches.len() - 1);
    } else if let Some((branch_index, height)) = prev_in_branch {
        if height == node.branches[branch_index].len() - 1 {
            node.branches[branch_index].push(block);
            info!(
                "extended branch {} to length {}",
                branch_index,
                node.branches[branch_index].len()
            );
            maybe_reorg(node, branch_index);
        } else {
            let mut branch = node.branches[branch_index][..=height].to_vec();
            branch.push(block);
            node.branches.push(branch);
            info!(
                "created branch {} from branch {} at height {}",
                node.branches.len() - 1,
                branch_index,
                height
            );
        }
    } else {
        return Err(Box::new(ErrorKind::UnknownParent));
    }

    Ok(())
}

/// Compare a just-extended branch against the main chain since their fork
/// point and switch over if the branch carries strictly more work.
fn maybe_reorg(node: &mut Node, branch_index: usize) {
    let branch = &node.branches[branch_index];
    let fork_parent = branch[0].prev_id.expect("branch roots always have a parent");
    let fork_height = match node.blocks.iter().position(|b| b.id() == fork_parent) {
        Some(height) => height,
        None => {
            // The branch roots inside another branch (its fork point was
            // itself reorged out). It can only win after an intermediate
            // reorg re-attaches it to the main chain.
            debug!("branch {} is not rooted on the main chain", branch_index);
            return;
        }
    };

    let branch_work = total_work(branch);
    let chain_work = total_work(&node.blocks[fork_height + 1..]);
    if branch_work > chain_work {
        info!("reorging to branch {}", branch_index);
        if let Err(err) = reorg(node, branch_index) {
            warn!("{err}");
        }
    }
}

/// Switch the main chain over to the given branch: pop and disconnect back
/// to the fork point, park the popped blocks in the branch's slot (so a
/// later reorg can switch back), then validate and connect the branch block
/// by block. Any validation failure reorgs right back, leaving the previous
/// main chain intact.
fn reorg(node: &mut Node, branch_index: usize) -> AcceptResult<()> {
    let branch = node.branches[branch_index].clone();
    let fork_parent = branch[0].prev_id.expect("branch roots always have a parent");

    let mut disconnected: Vec<Block> = vec![];
    while node.tip().id() != fork_parent {
        let block = node.blocks.pop().expect("fork point left the chain mid-reorg");
        for tx in block.txns.iter().rev() {
            node.disconnect_tx(tx);
        }
        disconnected.insert(0, block);
    }
    node.branches[branch_index] = disconnected;

    for block in branch {
        if let Err(err) = validate_block(node, &block, true) {
            // The branch slot now holds the old main-chain suffix, so
            // reorging to it restores the chain we just left.
            reorg(node, branch_index).expect("rollback to the previous chain cannot fail");
            warn!("reorg failed: {err}");
            return Err(Box::new(ErrorKind::ReorgFailed));
        }
        connect_block(node, block);
    }

    Ok(())
}

/// Append a validated block to the main chain and apply its transactions in
/// block order.
pub fn connect_block(node: &mut Node, block: Block) {
    for tx in &block.txns {
        node.connect_tx(tx);
    }
    node.blocks.push(block);
}

/// Admit a transaction to the mempool. Returns true if it was newly added
/// and should be gossiped, false if we already had it.
pub fn accept_tx(node: &mut Node, tx: Tx) -> AcceptResult<bool> {
    if node.mempool.contains(&tx) {
        return Ok(false);
    }

    // No two mempool transactions may contend for the same output.
    for outpoint in tx.spent_outpoints() {
        if node.mempool.iter().any(|pooled| pooled.spends(outpoint)) {
            return Err(Box::new(ErrorKind::DoubleSpend(*outpoint)));
        }
    }

    validate_tx(node, &tx)?;
    node.mempool.push(tx);
    Ok(true)
}

//! Contract interfaces of a Compound-v2-style deployment.

use alloy::sol;

sol! {
    interface IComptroller {
        function enterMarkets(address[] cTokens) external returns (uint256[]);
        function checkMembership(address account, address cToken) external view returns (bool);
        function getAccountLiquidity(address account)
            external view returns (uint256 errorCode, uint256 liquidity, uint256 shortfall);
        function getAssetsIn(address account) external view returns (address[]);
        function markets(address cToken)
            external view returns (bool isListed, uint256 collateralFactorMantissa, bool isComped);
    }
}

sol! {
    interface ICToken {
        function exchangeRateStored() external view returns (uint256);
        function supplyRatePerBlock() external view returns (uint256);
        function borrowRatePerBlock() external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function totalBorrows() external view returns (uint256);
        function getCash() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function getAccountSnapshot(address account)
            external view returns (uint256 errorCode, uint256 cTokenBalance, uint256 borrowBalance, uint256 exchangeRateMantissa);
        function borrow(uint256 borrowAmount) external returns (uint256);
        function redeem(uint256 redeemTokens) external returns (uint256);
        function redeemUnderlying(uint256 redeemAmount) external returns (uint256);
    }
}

// Markets over an ERC20 take the amount as an argument.
sol! {
    interface ICErc20 {
        function mint(uint256 mintAmount) external returns (uint256);
        function repayBorrow(uint256 repayAmount) external returns (uint256);
    }
}

// Markets over the native asset take the amount as transaction value.
sol! {
    interface ICEther {
        function mint() external payable;
        function repayBorrow() external payable;
    }
}

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        function transfer(address to, uint256 value) external returns (bool);
    }
}
